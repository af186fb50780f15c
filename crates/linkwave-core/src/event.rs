//! Structured simulation events
//!
//! The simulation reports what happened on the link as a stream of
//! [`SimEvent`] values pushed into an [`EventSink`] chosen by the caller.
//! A plotting or diagnostics layer can consume the stream directly or
//! from JSON lines:
//!
//! ```text
//! {"time":0.0,"host":1,"action":"Send","seq":0,"type":"DATA","status":"Success"}
//! {"time":0.5,"host":2,"action":"Receive","seq":0,"type":"DATA","status":"Success"}
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;

use crate::error::Result;
use crate::link::FrameKind;
use crate::types::{Address, SimTime};

/// What a host did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Send,
    Receive,
    Timeout,
}

/// Frame type an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Data,
    Ack,
    /// Not tied to a frame type
    Event,
}

impl From<FrameKind> for EventKind {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Data => EventKind::Data,
            FrameKind::Ack => EventKind::Ack,
        }
    }
}

/// Outcome of the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Lost,
}

/// One entry in the event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub time: SimTime,
    pub host: Address,
    pub action: Action,
    pub seq: u8,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub status: Status,
}

impl SimEvent {
    pub fn new(
        time: SimTime,
        host: Address,
        action: Action,
        seq: u8,
        kind: impl Into<EventKind>,
        status: Status,
    ) -> Self {
        Self {
            time,
            host,
            action,
            seq,
            kind: kind.into(),
            status,
        }
    }
}

/// Receiver for simulation events
pub trait EventSink {
    fn record(&mut self, event: SimEvent);
}

impl EventSink for Vec<SimEvent> {
    fn record(&mut self, event: SimEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn record(&mut self, event: SimEvent) {
        (**self).record(event);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _event: SimEvent) {}
}

/// Logs every event at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, event: SimEvent) {
        debug!(
            time = event.time,
            host = event.host,
            action = ?event.action,
            seq = event.seq,
            kind = ?event.kind,
            status = ?event.status,
            "sim event"
        );
    }
}

/// Serialize events as JSON lines
pub fn to_json_lines(events: &[SimEvent]) -> Result<String> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(event)?);
        out.push('\n');
    }
    Ok(out)
}

/// Write events as JSON lines
pub fn write_json_lines<W: Write>(mut writer: W, events: &[SimEvent]) -> Result<()> {
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
