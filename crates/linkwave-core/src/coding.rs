//! Forward error correction
//!
//! Hamming(7,4) adds three parity bits to every four data bits and corrects
//! any single bit error per codeword. Codeword layout:
//!
//! ```text
//! position:  1   2   3   4   5   6   7
//! bit:       p1  p2  d1  p3  d2  d3  d4
//!
//! p1 = d1 ⊕ d2 ⊕ d4
//! p2 = d1 ⊕ d3 ⊕ d4
//! p3 = d2 ⊕ d3 ⊕ d4
//! ```
//!
//! The syndrome read as a binary number is the 1-based position of the
//! flipped bit (zero when the codeword is clean).

use crate::types::Bit;

/// Hamming(7,4) encoder/decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct HammingCode;

impl HammingCode {
    /// Data bits per codeword
    pub const DATA_BITS: usize = 4;
    /// Bits per codeword
    pub const CODE_BITS: usize = 7;

    /// Encode four data bits into one codeword
    pub fn encode_block(data: [Bit; 4]) -> [Bit; 7] {
        let [d1, d2, d3, d4] = data.map(|b| (b != 0) as Bit);
        let p1 = d1 ^ d2 ^ d4;
        let p2 = d1 ^ d3 ^ d4;
        let p3 = d2 ^ d3 ^ d4;
        [p1, p2, d1, p3, d2, d3, d4]
    }

    /// Decode one codeword, correcting up to one flipped bit
    ///
    /// Returns the data bits and the 1-based position that was corrected.
    pub fn decode_block(code: [Bit; 7]) -> ([Bit; 4], Option<usize>) {
        let mut c = code.map(|b| (b != 0) as Bit);
        let s1 = c[0] ^ c[2] ^ c[4] ^ c[6];
        let s2 = c[1] ^ c[2] ^ c[5] ^ c[6];
        let s3 = c[3] ^ c[4] ^ c[5] ^ c[6];
        let syndrome = (s1 | (s2 << 1) | (s3 << 2)) as usize;

        let corrected = if syndrome != 0 {
            c[syndrome - 1] ^= 1;
            Some(syndrome)
        } else {
            None
        };

        ([c[2], c[4], c[5], c[6]], corrected)
    }

    /// Encode a bit stream, zero-padding to a multiple of four
    ///
    /// Returns the codeword stream and the number of padding bits added.
    pub fn encode(bits: &[Bit]) -> (Vec<Bit>, usize) {
        let padding = (Self::DATA_BITS - bits.len() % Self::DATA_BITS) % Self::DATA_BITS;
        let mut padded = bits.to_vec();
        padded.resize(bits.len() + padding, 0);

        let mut code = Vec::with_capacity(padded.len() / Self::DATA_BITS * Self::CODE_BITS);
        for chunk in padded.chunks_exact(Self::DATA_BITS) {
            code.extend_from_slice(&Self::encode_block([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        (code, padding)
    }

    /// Decode a codeword stream and strip `padding` trailing bits
    ///
    /// A trailing partial codeword is discarded.
    pub fn decode(code: &[Bit], padding: usize) -> Vec<Bit> {
        let mut bits = Vec::with_capacity(code.len() / Self::CODE_BITS * Self::DATA_BITS);
        for chunk in code.chunks_exact(Self::CODE_BITS) {
            let block = [chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6]];
            let (data, _) = Self::decode_block(block);
            bits.extend_from_slice(&data);
        }
        let keep = bits.len().saturating_sub(padding);
        bits.truncate(keep);
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::bit_errors;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn nibble(value: u8) -> [Bit; 4] {
        [(value >> 3) & 1, (value >> 2) & 1, (value >> 1) & 1, value & 1]
    }

    #[test]
    fn test_encode_known_codeword() {
        assert_eq!(HammingCode::encode_block([1, 0, 1, 1]), [0, 1, 1, 0, 0, 1, 1]);
        assert_eq!(HammingCode::encode_block([0, 0, 0, 0]), [0; 7]);
    }

    #[test]
    fn test_corrects_every_single_bit_error() {
        for value in 0..16u8 {
            let data = nibble(value);
            let code = HammingCode::encode_block(data);
            assert_eq!(HammingCode::decode_block(code), (data, None));

            for position in 0..7 {
                let mut corrupted = code;
                corrupted[position] ^= 1;
                let (decoded, corrected) = HammingCode::decode_block(corrupted);
                assert_eq!(decoded, data);
                assert_eq!(corrected, Some(position + 1));
            }
        }
    }

    #[test]
    fn test_stream_padding() {
        let bits = vec![1, 0, 1, 1, 0, 1, 1, 1, 0, 1];
        let (code, padding) = HammingCode::encode(&bits);
        assert_eq!(padding, 2);
        assert_eq!(code.len(), 21);
        assert_eq!(HammingCode::decode(&code, padding), bits);

        let (code, padding) = HammingCode::encode(&[1, 0, 0, 1]);
        assert_eq!(padding, 0);
        assert_eq!(HammingCode::decode(&code, padding), vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_coding_gain_on_binary_symmetric_channel() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let data: Vec<Bit> = (0..2000).map(|_| rng.gen_range(0..2)).collect();
        let flip_probability = 0.01;

        let raw: Vec<Bit> = data
            .iter()
            .map(|&b| if rng.gen_bool(flip_probability) { b ^ 1 } else { b })
            .collect();

        let (code, padding) = HammingCode::encode(&data);
        let noisy: Vec<Bit> = code
            .iter()
            .map(|&b| if rng.gen_bool(flip_probability) { b ^ 1 } else { b })
            .collect();
        let decoded = HammingCode::decode(&noisy, padding);

        assert_eq!(decoded.len(), data.len());
        assert!(bit_errors(&data, &decoded) < bit_errors(&data, &raw));
    }
}
