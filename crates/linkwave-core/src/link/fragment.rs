//! Message fragmentation
//!
//! A message longer than one frame is split into [`MAX_PAYLOAD_LEN`]-byte
//! fragments. The frame header has no fragment flag, so the payload size
//! marks the boundary: a full-size fragment means more follow, and a shorter
//! one ends the message. A message whose length is a multiple of
//! [`MAX_PAYLOAD_LEN`] ends with an empty fragment.
//!
//! ```text
//! 600-byte message → [255] [255] [90]
//! 510-byte message → [255] [255] [0]
//!  12-byte message → [12]
//! ```
//!
//! Reassembly relies on fragments arriving in order, which the endpoint
//! guarantees by holding each fragment back until the previous one is
//! acknowledged.

use std::collections::HashMap;

use super::frame::MAX_PAYLOAD_LEN;
use crate::types::Address;

/// Split `message` into frame payloads
pub fn fragment(message: &[u8]) -> Vec<Vec<u8>> {
    let mut fragments: Vec<Vec<u8>> = message
        .chunks(MAX_PAYLOAD_LEN)
        .map(<[u8]>::to_vec)
        .collect();
    if message.len() % MAX_PAYLOAD_LEN == 0 {
        fragments.push(Vec::new());
    }
    fragments
}

/// Whether a payload of this size ends a message
pub fn is_final_fragment(payload: &[u8]) -> bool {
    payload.len() < MAX_PAYLOAD_LEN
}

/// Per-source buffer of fragments received so far
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    partial: HashMap<Address, Vec<u8>>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delivered payload from `src`
    ///
    /// Returns the complete message once its final fragment arrives.
    pub fn push(&mut self, src: Address, payload: &[u8]) -> Option<Vec<u8>> {
        if is_final_fragment(payload) {
            let mut message = self.partial.remove(&src).unwrap_or_default();
            message.extend_from_slice(payload);
            Some(message)
        } else {
            self.partial.entry(src).or_default().extend_from_slice(payload);
            None
        }
    }

    /// Bytes buffered for an unfinished message from `src`
    pub fn buffered(&self, src: Address) -> usize {
        self.partial.get(&src).map_or(0, Vec::len)
    }

    /// Drop the unfinished message from `src`
    pub fn discard(&mut self, src: Address) -> Option<Vec<u8>> {
        self.partial.remove(&src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_sizes() {
        let sizes = |len: usize| -> Vec<usize> {
            fragment(&vec![7u8; len]).iter().map(Vec::len).collect()
        };
        assert_eq!(sizes(12), vec![12]);
        assert_eq!(sizes(0), vec![0]);
        assert_eq!(sizes(254), vec![254]);
        assert_eq!(sizes(255), vec![255, 0]);
        assert_eq!(sizes(600), vec![255, 255, 90]);
        assert_eq!(sizes(510), vec![255, 255, 0]);
    }

    #[test]
    fn test_reassembles_in_order() {
        let message: Vec<u8> = (0..700u32).map(|i| (i % 251) as u8).collect();
        let mut reassembler = Reassembler::new();

        let fragments = fragment(&message);
        let (last, rest) = fragments.split_last().unwrap();
        for piece in rest {
            assert_eq!(reassembler.push(1, piece), None);
        }
        assert_eq!(reassembler.buffered(1), 510);
        assert_eq!(reassembler.push(1, last), Some(message));
        assert_eq!(reassembler.buffered(1), 0);
    }

    #[test]
    fn test_sources_kept_apart() {
        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.push(1, &[1; MAX_PAYLOAD_LEN]), None);
        assert_eq!(reassembler.push(2, b"short"), Some(b"short".to_vec()));
        assert_eq!(reassembler.buffered(1), MAX_PAYLOAD_LEN);
        assert_eq!(reassembler.discard(1).map(|p| p.len()), Some(MAX_PAYLOAD_LEN));
        assert_eq!(reassembler.push(1, b""), Some(Vec::new()));
    }
}
