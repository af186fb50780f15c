//! Frame format
//!
//! Frames are serialized to unpacked bits, MSB first within each field:
//!
//! ```text
//! ┌────────┬────────┬────────┬────────┬────────┬─────────────────┬──────────┐
//! │ SRC:8  │ DST:8  │ TYPE:8 │ SEQ:8  │ LEN:8  │ PAYLOAD: LEN×8  │ CHECK:8  │
//! └────────┴────────┴────────┴────────┴────────┴─────────────────┴──────────┘
//!
//! TYPE:  1 = DATA, 2 = ACK
//! CHECK: (number of 1 bits in everything before it) mod 256
//! ```
//!
//! The check field is an additive checksum, not a CRC. It catches any single
//! flipped bit outside LEN but few multi-bit errors. A waveform carries
//! exactly one frame, so the parser also requires the bit count to match
//! LEN; a flipped LEN bit fails that check.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::{trace, warn};

use crate::bits::{push_byte, read_byte};
use crate::types::{Address, Bit};

/// Header length in bits (SRC, DST, TYPE, SEQ, LEN)
pub const HEADER_BITS: usize = 40;

/// Checksum length in bits
pub const CHECKSUM_BITS: usize = 8;

/// Shortest valid frame: header, empty payload, checksum
pub const MIN_FRAME_BITS: usize = HEADER_BITS + CHECKSUM_BITS;

/// Largest payload the 8-bit LEN field can describe
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Payload carried by every ACK frame
pub const ACK_PAYLOAD: &[u8] = b"ACK";

/// Frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum FrameKind {
    /// Application data
    Data = 1,
    /// Acknowledgment of a DATA frame with the same sequence number
    Ack = 2,
}

impl FrameKind {
    /// Parse the TYPE field
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameKind::Data),
            2 => Some(FrameKind::Ack),
            _ => None,
        }
    }

    /// TYPE field value
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Data => write!(f, "DATA"),
            FrameKind::Ack => write!(f, "ACK"),
        }
    }
}

/// An addressed, sequenced frame
///
/// The checksum is not stored; it is always recomputed from the other
/// fields, so a `Frame` value is valid by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    src: Address,
    dst: Address,
    kind: FrameKind,
    seq: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, truncating the payload to [`MAX_PAYLOAD_LEN`] bytes
    pub fn new(src: Address, dst: Address, kind: FrameKind, seq: u8, payload: &[u8]) -> Self {
        let payload = if payload.len() > MAX_PAYLOAD_LEN {
            warn!(
                len = payload.len(),
                max = MAX_PAYLOAD_LEN,
                "payload too long for one frame, truncating"
            );
            payload[..MAX_PAYLOAD_LEN].to_vec()
        } else {
            payload.to_vec()
        };

        Self {
            src,
            dst,
            kind,
            seq,
            payload,
        }
    }

    /// DATA frame
    pub fn data(src: Address, dst: Address, seq: u8, payload: &[u8]) -> Self {
        Self::new(src, dst, FrameKind::Data, seq, payload)
    }

    /// ACK frame for sequence number `seq`
    pub fn ack(src: Address, dst: Address, seq: u8) -> Self {
        Self::new(src, dst, FrameKind::Ack, seq, ACK_PAYLOAD)
    }

    pub fn src(&self) -> Address {
        self.src
    }

    pub fn dst(&self) -> Address {
        self.dst
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame, keeping only the payload
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn is_data(&self) -> bool {
        self.kind == FrameKind::Data
    }

    pub fn is_ack(&self) -> bool {
        self.kind == FrameKind::Ack
    }

    /// Serialized length in bits
    pub fn bit_len(&self) -> usize {
        MIN_FRAME_BITS + self.payload.len() * 8
    }

    /// Header and payload bits, without the checksum
    fn body_bits(&self) -> Vec<Bit> {
        let mut bits = Vec::with_capacity(self.bit_len());
        push_byte(&mut bits, self.src);
        push_byte(&mut bits, self.dst);
        push_byte(&mut bits, self.kind.as_byte());
        push_byte(&mut bits, self.seq);
        push_byte(&mut bits, self.payload.len() as u8);
        for byte in &self.payload {
            push_byte(&mut bits, *byte);
        }
        bits
    }

    /// Checksum this frame serializes with
    pub fn checksum(&self) -> u8 {
        additive_checksum(&self.body_bits())
    }

    /// Serialize to bits
    pub fn to_bits(&self) -> Vec<Bit> {
        let mut bits = self.body_bits();
        let checksum = additive_checksum(&bits);
        push_byte(&mut bits, checksum);
        bits
    }

    /// Parse a frame from demodulated bits
    ///
    /// Returns `None` for a short frame, a bit count that disagrees with
    /// the LEN field, a checksum mismatch or an unknown TYPE.
    pub fn from_bits(bits: &[Bit]) -> Option<Self> {
        if bits.len() < MIN_FRAME_BITS {
            trace!(bits = bits.len(), "frame shorter than header and checksum");
            return None;
        }

        let field = |index: usize| read_byte(&bits[index * 8..]);
        let len = field(4) as usize;
        let body_len = HEADER_BITS + len * 8;
        match bits.len().cmp(&(body_len + CHECKSUM_BITS)) {
            Ordering::Less => {
                trace!(bits = bits.len(), len, "payload length runs past end of frame");
                return None;
            }
            Ordering::Greater => {
                trace!(bits = bits.len(), len, "bits left over after checksum");
                return None;
            }
            Ordering::Equal => {}
        }

        let expected = additive_checksum(&bits[..body_len]);
        let received = read_byte(&bits[body_len..]);
        if expected != received {
            trace!(expected, received, "checksum mismatch");
            return None;
        }

        let type_byte = field(2);
        let Some(kind) = FrameKind::from_byte(type_byte) else {
            trace!(type_byte, "unknown frame type");
            return None;
        };

        let payload = bits[HEADER_BITS..body_len]
            .chunks_exact(8)
            .map(read_byte)
            .collect();

        Some(Self {
            src: field(0),
            dst: field(1),
            kind,
            seq: field(3),
            payload,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} seq={} len={}",
            self.kind,
            self.src,
            self.dst,
            self.seq,
            self.payload.len()
        )
    }
}

/// Sum of bit values modulo 256
pub fn additive_checksum(bits: &[Bit]) -> u8 {
    bits.iter()
        .fold(0u8, |acc, &bit| acc.wrapping_add((bit != 0) as u8))
}
