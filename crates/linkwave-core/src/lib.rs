//! # Linkwave Core
//!
//! A layered digital link simulator: bits are modulated onto a waveform,
//! degraded by a channel, demodulated, parsed into addressed frames and
//! delivered reliably by stop-and-wait ARQ.
//!
//! ## Overview
//!
//! - **Channel**: propagation delay, attenuation, additive Gaussian noise and
//!   optional Rayleigh fading ([`channel`])
//! - **Modem**: ASK, FSK and BPSK with preamble synchronization ([`modem`])
//! - **Framing**: addressed, sequenced, checksummed frames ([`link::frame`])
//!   and fragmentation of longer messages ([`link::fragment`])
//! - **ARQ**: acknowledgments, timeouts, retransmission and duplicate
//!   suppression ([`link::endpoint`])
//! - **Routing**: static next-hop forwarding ([`link::router`])
//! - **Simulation**: a discrete-event driver with an injectable event sink
//!   ([`simulation`], [`event`])
//!
//! ## Signal Flow
//!
//! ```text
//! TX: payload → Frame → bits → Modem (preamble + symbols) → waveform
//! CH: waveform → delay → attenuation → noise → [fading] → waveform
//! RX: waveform → Sync → Demod → bits → Frame check → ARQ → payload / ACK
//! ```
//!
//! ## Example
//!
//! ```rust
//! use linkwave_core::prelude::*;
//!
//! let mut host1 = ReliableEndpoint::new(1, ModemConfig::default(), ArqConfig::default())?;
//! let mut host2 = ReliableEndpoint::new(2, ModemConfig::default(), ArqConfig::default())?;
//! let mut cable = Cable::new(ChannelConfig::default().with_noise(0.1))?;
//!
//! let tx = host1.send(2, b"Hello", 0.0, true);
//! let rx = host2.receive(&cable.transmit(&tx.waveform), 0.5);
//! assert_eq!(rx.delivered.as_deref(), Some(&b"Hello"[..]));
//!
//! if let Some(ack) = rx.response {
//!     host1.receive(&cable.transmit(&ack.waveform), 1.0);
//! }
//! assert!(host1.is_idle());
//! # Ok::<(), linkwave_core::LinkError>(())
//! ```

pub mod bits;
pub mod channel;
pub mod coding;
pub mod config;
pub mod error;
pub mod event;
pub mod link;
pub mod modem;
pub mod simulation;
pub mod types;

// Re-export main types
pub use channel::{build_channel, Cable, Degradation, FadingChannel};
pub use coding::HammingCode;
pub use config::{ArqConfig, ChannelConfig, FadingConfig, LinkConfig, ModemConfig, SimConfig};
pub use error::{LinkError, Result};
pub use event::{EventSink, NullSink, SimEvent, TracingSink};
pub use link::{Frame, FrameKind, Reassembler, ReliableEndpoint, Router, RoutingTable};
pub use modem::{Modem, Scheme, PREAMBLE};
pub use simulation::{Simulation, SimStats};
pub use types::{Address, Bit, Sample, SimTime};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::channel::{Cable, Degradation, FadingChannel};
    pub use crate::config::{ArqConfig, ChannelConfig, FadingConfig, LinkConfig, ModemConfig};
    pub use crate::event::{EventSink, SimEvent};
    pub use crate::link::{Frame, FrameKind, ReliableEndpoint, Router};
    pub use crate::modem::{Modem, Scheme};
    pub use crate::simulation::Simulation;
    pub use crate::types::{Address, Bit, Sample};
}
