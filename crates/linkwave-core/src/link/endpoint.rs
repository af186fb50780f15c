//! Stop-and-wait ARQ endpoint
//!
//! A [`ReliableEndpoint`] turns payloads into modulated DATA frames, tracks
//! every reliable send until its ACK arrives, retransmits on timeout and
//! suppresses duplicate deliveries. Per outstanding send:
//!
//! ```text
//!            send()                 ACK(seq)
//! Unsent ───────────► AwaitingAck ───────────► Acked (entry removed)
//!                      │      ▲
//!                      └──────┘
//!              timeout: retransmit same frame
//! ```
//!
//! With a retransmission limit configured, an entry that times out after
//! its last allowed retransmission moves to the abandoned list instead.
//!
//! [`ReliableEndpoint::send_message`] carries messages of any length. It
//! queues the message's fragments and releases the next one only when the
//! previous one is acknowledged, so the receiver sees them in order and
//! reassembles the message.
//!
//! The endpoint has no clock of its own; callers pass the current logical
//! time to every operation.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, trace, warn};

use super::fragment::{fragment, Reassembler};
use super::frame::Frame;
use crate::config::{ArqConfig, ModemConfig};
use crate::error::Result;
use crate::modem::Modem;
use crate::types::{Address, Sample, SimTime};

/// A reliable send awaiting acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    /// The frame as first sent; retransmissions reuse it unchanged
    pub frame: Frame,
    /// Time of the most recent (re)transmission
    pub last_sent_at: SimTime,
    /// Retransmissions so far
    pub retransmissions: u32,
}

/// Sequence numbers already delivered, per source
///
/// Each source keeps only its most recent `window` sequence numbers, so the
/// set stays bounded and a sequence number becomes deliverable again once
/// the 8-bit counter has wrapped past it.
#[derive(Debug, Clone)]
pub struct SeenSet {
    window: usize,
    by_source: HashMap<Address, VecDeque<u8>>,
}

impl SeenSet {
    /// Create a set remembering `window` sequence numbers per source
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            by_source: HashMap::new(),
        }
    }

    /// Record `(src, seq)`; returns true if it was not already present
    pub fn check_and_add(&mut self, src: Address, seq: u8) -> bool {
        let recent = self.by_source.entry(src).or_default();
        if recent.contains(&seq) {
            return false;
        }
        if recent.len() >= self.window {
            recent.pop_front();
        }
        recent.push_back(seq);
        true
    }

    /// Whether `(src, seq)` is currently remembered
    pub fn contains(&self, src: Address, seq: u8) -> bool {
        self.by_source
            .get(&src)
            .map_or(false, |recent| recent.contains(&seq))
    }

    /// Total remembered pairs across all sources
    pub fn len(&self) -> usize {
        self.by_source.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A message fragment waiting for its turn
#[derive(Debug, Clone, PartialEq)]
struct QueuedFragment {
    dst: Address,
    payload: Vec<u8>,
    last: bool,
}

/// The fragment currently awaiting its ACK
#[derive(Debug, Clone, Copy, PartialEq)]
struct InFlightFragment {
    seq: u8,
    last: bool,
}

/// A frame ready to put on a link
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    /// The frame that was modulated
    pub frame: Frame,
    /// Modulated waveform, preamble included
    pub waveform: Vec<Sample>,
}

/// Outcome of receiving one waveform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reception {
    /// Decoded frame, if the waveform carried a valid one
    pub frame: Option<Frame>,
    /// Frame to send in reply: the ACK for DATA addressed to this endpoint,
    /// or the next queued message fragment once an ACK releases it
    pub response: Option<Transmission>,
    /// Frame payload delivered to the application (first copy only)
    pub delivered: Option<Vec<u8>>,
    /// Complete message, when this frame was its final fragment
    pub message: Option<Vec<u8>>,
    /// DATA frame was already delivered earlier
    pub duplicate: bool,
}

impl Reception {
    /// Nothing decoded or nothing to do
    pub fn is_empty(&self) -> bool {
        self.response.is_none() && self.delivered.is_none()
    }
}

/// Per-endpoint counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub delivered: u64,
    pub messages: u64,
    pub duplicates: u64,
    pub undecodable: u64,
    pub misaddressed: u64,
    pub abandoned: u64,
}

/// Host with an address, a modem and stop-and-wait ARQ state
#[derive(Debug, Clone)]
pub struct ReliableEndpoint {
    address: Address,
    modem: Modem,
    config: ArqConfig,
    next_seq: u8,
    pending: BTreeMap<u8, PendingSend>,
    seen: SeenSet,
    abandoned: Vec<Frame>,
    outbox: VecDeque<QueuedFragment>,
    in_flight: Option<InFlightFragment>,
    reassembler: Reassembler,
    stats: EndpointStats,
}

impl ReliableEndpoint {
    /// Create an endpoint, rejecting invalid modem or ARQ configuration
    pub fn new(address: Address, modem: ModemConfig, config: ArqConfig) -> Result<Self> {
        config.validate()?;
        let modem = Modem::new(modem)?;
        Ok(Self {
            address,
            modem,
            seen: SeenSet::new(config.dedup_window),
            config,
            next_seq: 0,
            pending: BTreeMap::new(),
            abandoned: Vec::new(),
            outbox: VecDeque::new(),
            in_flight: None,
            reassembler: Reassembler::new(),
            stats: EndpointStats::default(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn modem(&self) -> &Modem {
        &self.modem
    }

    pub fn config(&self) -> &ArqConfig {
        &self.config
    }

    /// Sequence number the next DATA frame will carry
    pub fn next_seq(&self) -> u8 {
        self.next_seq
    }

    /// Outstanding reliable sends, keyed by sequence number
    pub fn pending(&self) -> &BTreeMap<u8, PendingSend> {
        &self.pending
    }

    /// No reliable send is awaiting an ACK and no fragment is queued
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.outbox.is_empty()
    }

    /// Message fragments not yet sent
    pub fn queued_fragments(&self) -> usize {
        self.outbox.len()
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn stats(&self) -> &EndpointStats {
        &self.stats
    }

    /// Modulate `frame` with this endpoint's scheme
    pub fn transmission(&self, frame: Frame) -> Transmission {
        let waveform = self.modem.modulate(&frame.to_bits(), self.modem.scheme());
        Transmission { frame, waveform }
    }

    /// Build and modulate a DATA frame for `dst`
    ///
    /// A reliable send is tracked until acknowledged and advances the
    /// sequence counter. An unreliable send reuses the current sequence
    /// number and is forgotten immediately.
    pub fn send(&mut self, dst: Address, payload: &[u8], now: SimTime, reliable: bool) -> Transmission {
        let seq = self.next_seq;
        let frame = Frame::data(self.address, dst, seq, payload);

        if reliable {
            let replaced = self.pending.insert(
                seq,
                PendingSend {
                    frame: frame.clone(),
                    last_sent_at: now,
                    retransmissions: 0,
                },
            );
            if replaced.is_some() {
                warn!(address = self.address, seq, "sequence space exhausted, replacing unacknowledged send");
            }
            self.next_seq = self.next_seq.wrapping_add(1);
        }

        debug!(address = self.address, dst, seq, reliable, time = now, "send");
        self.stats.frames_sent += 1;
        self.transmission(frame)
    }

    /// Queue a message of any length for reliable delivery to `dst`
    ///
    /// Returns the first fragment's transmission, or `None` while an
    /// earlier message is still in progress; the queued fragments then go
    /// out as [`Reception::response`] of the ACKs that release them.
    pub fn send_message(&mut self, dst: Address, message: &[u8], now: SimTime) -> Option<Transmission> {
        let fragments = fragment(message);
        let count = fragments.len();
        debug!(address = self.address, dst, bytes = message.len(), fragments = count, "message queued");
        self.outbox
            .extend(fragments.into_iter().enumerate().map(|(i, payload)| QueuedFragment {
                dst,
                payload,
                last: i + 1 == count,
            }));
        self.poll_outbox(now)
    }

    /// Send the next queued fragment if none is awaiting its ACK
    pub fn poll_outbox(&mut self, now: SimTime) -> Option<Transmission> {
        if self.in_flight.is_some() {
            return None;
        }
        let next = self.outbox.pop_front()?;
        let transmission = self.send(next.dst, &next.payload, now, true);
        self.in_flight = Some(InFlightFragment {
            seq: transmission.frame.seq(),
            last: next.last,
        });
        Some(transmission)
    }

    /// Demodulate and parse a waveform with this endpoint's scheme
    pub fn decode(&mut self, waveform: &[Sample]) -> Option<Frame> {
        let bits = self.modem.demodulate(waveform, self.modem.scheme());
        let frame = Frame::from_bits(&bits);
        if frame.is_none() {
            debug!(address = self.address, bits = bits.len(), "undecodable waveform");
            self.stats.undecodable += 1;
        }
        frame
    }

    /// Receive a waveform
    ///
    /// An undecodable waveform or a frame for another address yields
    /// [`Reception::default`] and leaves the ARQ state untouched.
    pub fn receive(&mut self, waveform: &[Sample], now: SimTime) -> Reception {
        match self.decode(waveform) {
            Some(frame) => self.handle_frame(frame, now),
            None => Reception::default(),
        }
    }

    /// Apply an already decoded frame
    pub fn handle_frame(&mut self, frame: Frame, now: SimTime) -> Reception {
        if frame.dst() != self.address {
            trace!(address = self.address, %frame, "not addressed here, discarding");
            self.stats.misaddressed += 1;
            return Reception::default();
        }

        if frame.is_ack() {
            let response = self.handle_ack(&frame, now);
            return Reception {
                frame: Some(frame),
                response,
                ..Default::default()
            };
        }

        let (src, seq) = (frame.src(), frame.seq());
        let is_new = self.seen.check_and_add(src, seq);
        let (delivered, message) = if is_new {
            debug!(address = self.address, src, seq, time = now, "delivered");
            self.stats.delivered += 1;
            let message = self.reassembler.push(src, frame.payload());
            if message.is_some() {
                self.stats.messages += 1;
            }
            (Some(frame.payload().to_vec()), message)
        } else {
            debug!(address = self.address, src, seq, time = now, "duplicate, re-acknowledging");
            self.stats.duplicates += 1;
            (None, None)
        };

        self.stats.acks_sent += 1;
        let response = self.transmission(Frame::ack(self.address, src, seq));

        Reception {
            frame: Some(frame),
            response: Some(response),
            delivered,
            message,
            duplicate: !is_new,
        }
    }

    /// Clear the acknowledged send; returns the fragment it releases
    fn handle_ack(&mut self, ack: &Frame, now: SimTime) -> Option<Transmission> {
        match self.pending.remove(&ack.seq()) {
            Some(entry) => {
                debug!(
                    address = self.address,
                    seq = ack.seq(),
                    time = now,
                    retransmissions = entry.retransmissions,
                    "acknowledged"
                );
                self.stats.acks_received += 1;
                if self.in_flight.map_or(false, |f| f.seq == ack.seq()) {
                    self.in_flight = None;
                    return self.poll_outbox(now);
                }
                None
            }
            None => {
                debug!(address = self.address, seq = ack.seq(), "ACK for nothing pending, ignored");
                None
            }
        }
    }

    /// Retransmit every pending send older than the timeout interval
    ///
    /// Each returned transmission carries the stored frame unchanged. Entries
    /// stay pending until acknowledged, unless a retransmission limit is
    /// configured and exhausted, in which case they are moved to the
    /// abandoned list.
    pub fn check_timeouts(&mut self, now: SimTime) -> Vec<Transmission> {
        let timeout = self.config.timeout_interval;
        let limit = self.config.max_retransmissions;

        let mut resend = Vec::new();
        let mut exhausted = Vec::new();
        for (&seq, entry) in self.pending.iter_mut() {
            if now - entry.last_sent_at <= timeout {
                continue;
            }
            if limit.map_or(false, |limit| entry.retransmissions >= limit) {
                exhausted.push(seq);
                continue;
            }
            entry.last_sent_at = now;
            entry.retransmissions += 1;
            resend.push(entry.frame.clone());
        }

        for seq in exhausted {
            if let Some(entry) = self.pending.remove(&seq) {
                warn!(
                    address = self.address,
                    seq,
                    retransmissions = entry.retransmissions,
                    "giving up on unacknowledged frame"
                );
                self.stats.abandoned += 1;
                self.abandoned.push(entry.frame);
                self.abandon_message(seq);
            }
        }

        self.stats.retransmissions += resend.len() as u64;
        resend
            .into_iter()
            .map(|frame| {
                debug!(address = self.address, seq = frame.seq(), time = now, "timeout, retransmitting");
                self.transmission(frame)
            })
            .collect()
    }

    /// Drop the rest of a message whose in-flight fragment was given up on
    fn abandon_message(&mut self, seq: u8) {
        let Some(fragment) = self.in_flight.filter(|f| f.seq == seq) else {
            return;
        };
        self.in_flight = None;
        if fragment.last {
            return;
        }
        let mut dropped = 0;
        while let Some(next) = self.outbox.pop_front() {
            dropped += 1;
            if next.last {
                break;
            }
        }
        warn!(address = self.address, seq, dropped, "message abandoned, dropping its remaining fragments");
    }

    /// Take the frames given up on since the last call
    pub fn drain_abandoned(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.abandoned)
    }
}
