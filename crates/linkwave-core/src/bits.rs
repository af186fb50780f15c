//! Bit packing helpers
//!
//! Frames and modems work on unpacked bit sequences (one `u8` per bit, MSB
//! first within each byte). These helpers convert between that form, packed
//! bytes, and text, and count bit errors between two sequences.

use crate::types::Bit;

/// Unpack bytes to individual bits (MSB first)
pub fn bytes_to_bits(data: &[u8]) -> Vec<Bit> {
    let mut bits = Vec::with_capacity(data.len() * 8);
    for byte in data {
        push_byte(&mut bits, *byte);
    }
    bits
}

/// Append the 8 bits of `byte` (MSB first)
pub fn push_byte(bits: &mut Vec<Bit>, byte: u8) {
    for i in (0..8).rev() {
        bits.push((byte >> i) & 1);
    }
}

/// Read one byte from the first 8 bits of `bits` (MSB first)
///
/// Any non-zero bit value counts as `1`. Missing trailing bits read as `0`.
pub fn read_byte(bits: &[Bit]) -> u8 {
    bits.iter()
        .take(8)
        .enumerate()
        .fold(0u8, |acc, (i, &bit)| acc | (((bit != 0) as u8) << (7 - i)))
}

/// Pack individual bits to bytes (MSB first)
///
/// A trailing group of fewer than 8 bits is discarded.
pub fn bits_to_bytes(bits: &[Bit]) -> Vec<u8> {
    bits.chunks_exact(8).map(read_byte).collect()
}

/// Convert text to bits, one byte per UTF-8 code unit
pub fn str_to_bits(text: &str) -> Vec<Bit> {
    bytes_to_bits(text.as_bytes())
}

/// Convert bits back to text, replacing invalid UTF-8
pub fn bits_to_string(bits: &[Bit]) -> String {
    String::from_utf8_lossy(&bits_to_bytes(bits)).into_owned()
}

/// Count positions where two bit sequences disagree
///
/// Only the common prefix is compared.
pub fn bit_errors(sent: &[Bit], received: &[Bit]) -> usize {
    sent.iter()
        .zip(received)
        .filter(|(a, b)| (**a != 0) != (**b != 0))
        .count()
}

/// Bit error rate over the common prefix of two sequences
///
/// Returns 1.0 when there is nothing to compare (for example when the
/// receiver failed to synchronize and produced no bits).
pub fn bit_error_rate(sent: &[Bit], received: &[Bit]) -> f64 {
    let compared = sent.len().min(received.len());
    if compared == 0 {
        return 1.0;
    }
    bit_errors(sent, received) as f64 / compared as f64
}
