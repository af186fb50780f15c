//! Baseband modem: bits to waveform and back
//!
//! Three binary schemes are supported, each using `N` samples per bit
//! (`samples_per_bit`) on a normalized time axis `t = k / N`:
//!
//! | Scheme | Bit 1                  | Bit 0                   | Decision                     |
//! |--------|------------------------|-------------------------|------------------------------|
//! | ASK    | level `+1`             | level `-1`              | sign of segment mean         |
//! | BPSK   | `sin(2π·2t)`           | `-sin(2π·2t)`           | sign of carrier inner product|
//! | FSK    | `sin(2π·2t)` (mark)    | `sin(2π·1t)` (space)    | larger quadrature energy     |
//!
//! Every transmission starts with the preamble `10101010`. The receiver
//! locates it by cross-correlation (see [`sync`]) and decodes the bits that
//! follow. BPSK corrects a negative correlation peak by inverting the whole
//! frame; FSK is noncoherent and needs no phase reference.
//!
//! ```rust
//! use linkwave_core::config::ModemConfig;
//! use linkwave_core::modem::{Modem, Scheme};
//!
//! let modem = Modem::new(ModemConfig::default()).unwrap();
//! let waveform = modem.modulate(&[1, 0, 1, 1], Scheme::Ask);
//! assert_eq!(modem.demodulate(&waveform, Scheme::Ask), vec![1, 0, 1, 1]);
//! ```

pub mod sync;

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

use crate::config::ModemConfig;
use crate::error::{LinkError, Result};
use crate::types::{Bit, Sample};

pub use sync::SyncResult;

/// Synchronization preamble prepended to every transmission
pub const PREAMBLE: [Bit; 8] = [1, 0, 1, 0, 1, 0, 1, 0];

/// BPSK carrier cycles per bit
const BPSK_CYCLES: f64 = 2.0;
/// FSK mark (bit 1) cycles per bit
const FSK_MARK_CYCLES: f64 = 2.0;
/// FSK space (bit 0) cycles per bit
const FSK_SPACE_CYCLES: f64 = 1.0;

/// Modulation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scheme {
    /// Amplitude shift keying (bipolar levels)
    #[default]
    Ask,
    /// Frequency shift keying
    Fsk,
    /// Binary phase shift keying
    Bpsk,
}

impl Scheme {
    /// All supported schemes
    pub const ALL: [Scheme; 3] = [Scheme::Ask, Scheme::Fsk, Scheme::Bpsk];

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Ask => "ASK",
            Scheme::Fsk => "FSK",
            Scheme::Bpsk => "BPSK",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scheme {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASK" => Ok(Scheme::Ask),
            "FSK" => Ok(Scheme::Fsk),
            "BPSK" => Ok(Scheme::Bpsk),
            other => Err(LinkError::Config(format!(
                "unknown modulation scheme '{}'",
                other
            ))),
        }
    }
}

/// One reference tone with its quadrature partner
#[derive(Debug, Clone)]
struct Tone {
    sin: Vec<Sample>,
    cos: Vec<Sample>,
}

impl Tone {
    fn new(cycles_per_bit: f64, samples_per_bit: usize) -> Self {
        let phase = |k: usize| 2.0 * PI * cycles_per_bit * k as f64 / samples_per_bit as f64;
        Self {
            sin: (0..samples_per_bit).map(|k| phase(k).sin()).collect(),
            cos: (0..samples_per_bit).map(|k| phase(k).cos()).collect(),
        }
    }

    /// Noncoherent energy of `segment` at this tone's frequency
    fn energy(&self, segment: &[Sample]) -> f64 {
        let i = sync::dot(segment, &self.cos);
        let q = sync::dot(segment, &self.sin);
        i * i + q * q
    }
}

/// Modulator/demodulator for the three binary schemes
#[derive(Debug, Clone)]
pub struct Modem {
    config: ModemConfig,
    bpsk_carrier: Vec<Sample>,
    mark: Tone,
    space: Tone,
    preamble_ask: Vec<Sample>,
    preamble_fsk: Vec<Sample>,
    preamble_bpsk: Vec<Sample>,
}

impl Modem {
    /// Create a modem, rejecting invalid configuration
    pub fn new(config: ModemConfig) -> Result<Self> {
        config.validate()?;
        let n = config.samples_per_bit;

        let mut modem = Self {
            bpsk_carrier: Tone::new(BPSK_CYCLES, n).sin,
            mark: Tone::new(FSK_MARK_CYCLES, n),
            space: Tone::new(FSK_SPACE_CYCLES, n),
            preamble_ask: Vec::new(),
            preamble_fsk: Vec::new(),
            preamble_bpsk: Vec::new(),
            config,
        };

        modem.preamble_ask = modem.waveform(&PREAMBLE, Scheme::Ask);
        modem.preamble_fsk = modem.waveform(&PREAMBLE, Scheme::Fsk);
        modem.preamble_bpsk = modem.waveform(&PREAMBLE, Scheme::Bpsk);
        Ok(modem)
    }

    /// The modem configuration
    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Default scheme from the configuration
    pub fn scheme(&self) -> Scheme {
        self.config.scheme
    }

    /// Samples per bit
    pub fn samples_per_bit(&self) -> usize {
        self.config.samples_per_bit
    }

    /// Number of samples `modulate` produces for `bit_count` bits
    pub fn waveform_len(&self, bit_count: usize) -> usize {
        (PREAMBLE.len() + bit_count) * self.config.samples_per_bit
    }

    /// Reference preamble waveform for `scheme`
    pub fn preamble_reference(&self, scheme: Scheme) -> &[Sample] {
        match scheme {
            Scheme::Ask => &self.preamble_ask,
            Scheme::Fsk => &self.preamble_fsk,
            Scheme::Bpsk => &self.preamble_bpsk,
        }
    }

    /// Modulate `bits` with the preamble prepended
    ///
    /// Any non-zero bit value is sent as `1`.
    pub fn modulate(&self, bits: &[Bit], scheme: Scheme) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(self.waveform_len(bits.len()));
        samples.extend_from_slice(self.preamble_reference(scheme));
        self.extend_waveform(&mut samples, bits, scheme);
        samples
    }

    /// Waveform for `bits` without a preamble
    fn waveform(&self, bits: &[Bit], scheme: Scheme) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(bits.len() * self.config.samples_per_bit);
        self.extend_waveform(&mut samples, bits, scheme);
        samples
    }

    fn extend_waveform(&self, samples: &mut Vec<Sample>, bits: &[Bit], scheme: Scheme) {
        let n = self.config.samples_per_bit;
        for &bit in bits {
            let one = bit != 0;
            match scheme {
                Scheme::Ask => {
                    let level = if one { 1.0 } else { -1.0 };
                    samples.extend(std::iter::repeat(level).take(n));
                }
                Scheme::Bpsk => {
                    if one {
                        samples.extend_from_slice(&self.bpsk_carrier);
                    } else {
                        samples.extend(self.bpsk_carrier.iter().map(|s| -s));
                    }
                }
                Scheme::Fsk => {
                    let tone = if one { &self.mark } else { &self.space };
                    samples.extend_from_slice(&tone.sin);
                }
            }
        }
    }

    /// Locate the preamble in a received waveform
    pub fn synchronize(&self, waveform: &[Sample], scheme: Scheme) -> Option<SyncResult> {
        sync::locate_preamble(
            waveform,
            self.preamble_reference(scheme),
            self.config.detection_threshold,
        )
    }

    /// Demodulate a received waveform
    ///
    /// Returns the bits following the preamble, or an empty vector when no
    /// preamble is found. A trailing segment shorter than one bit is dropped.
    pub fn demodulate(&self, waveform: &[Sample], scheme: Scheme) -> Vec<Bit> {
        let Some(sync) = self.synchronize(waveform, scheme) else {
            trace!(samples = waveform.len(), %scheme, "no preamble detected");
            return Vec::new();
        };

        let data_start = sync.start + self.preamble_reference(scheme).len();
        let data = &waveform[data_start..];

        let mut bits: Vec<Bit> = data
            .chunks_exact(self.config.samples_per_bit)
            .map(|segment| self.decide(segment, scheme))
            .collect();

        if scheme == Scheme::Bpsk && sync.is_inverted() {
            trace!(peak = sync.peak, "inverted preamble, correcting BPSK polarity");
            for bit in bits.iter_mut() {
                *bit ^= 1;
            }
        }

        trace!(start = sync.start, peak = sync.peak, bits = bits.len(), %scheme, "demodulated");
        bits
    }

    /// Hard decision for one bit-length segment
    fn decide(&self, segment: &[Sample], scheme: Scheme) -> Bit {
        let one = match scheme {
            Scheme::Ask => segment.iter().sum::<f64>() / segment.len() as f64 > 0.0,
            Scheme::Bpsk => sync::dot(segment, &self.bpsk_carrier) > 0.0,
            Scheme::Fsk => self.mark.energy(segment) > self.space.energy(segment),
        };
        one as Bit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Cable, Degradation};
    use crate::config::ChannelConfig;

    fn modem() -> Modem {
        Modem::new(ModemConfig::default()).unwrap()
    }

    fn test_bits() -> Vec<Bit> {
        crate::bits::str_to_bits("Hello, link!")
    }

    #[test]
    fn test_scheme_parse_and_display() {
        assert_eq!("bpsk".parse::<Scheme>().unwrap(), Scheme::Bpsk);
        assert_eq!("FSK".parse::<Scheme>().unwrap(), Scheme::Fsk);
        assert!("QAM".parse::<Scheme>().is_err());
        assert_eq!(Scheme::Ask.to_string(), "ASK");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ModemConfig::default().with_samples_per_bit(0);
        assert!(Modem::new(config).is_err());
    }

    #[test]
    fn test_waveform_length() {
        let modem = modem();
        for scheme in Scheme::ALL {
            let waveform = modem.modulate(&[1, 0, 1], scheme);
            assert_eq!(waveform.len(), (8 + 3) * 20);
            assert_eq!(waveform.len(), modem.waveform_len(3));
        }
    }

    #[test]
    fn test_ask_levels() {
        let modem = modem();
        let waveform = modem.modulate(&[0], Scheme::Ask);
        // Preamble starts with 1, then 0
        assert!(waveform[..20].iter().all(|&s| s == 1.0));
        assert!(waveform[20..40].iter().all(|&s| s == -1.0));
        // Payload bit 0
        assert!(waveform[160..].iter().all(|&s| s == -1.0));
    }

    #[test]
    fn test_bpsk_phase_flip() {
        let modem = modem();
        let one = modem.modulate(&[1], Scheme::Bpsk);
        let zero = modem.modulate(&[0], Scheme::Bpsk);
        for (a, b) in one[160..].iter().zip(&zero[160..]) {
            assert!((a + b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ask_scenario_bits() {
        let modem = modem();
        let mut channel = Cable::new(ChannelConfig::ideal()).unwrap();
        let received = channel.transmit(&modem.modulate(&[1, 0, 1, 1], Scheme::Ask));
        assert_eq!(modem.demodulate(&received, Scheme::Ask), vec![1, 0, 1, 1]);
    }

    #[test]
    fn test_roundtrip_all_schemes() {
        let modem = modem();
        let bits = test_bits();
        for scheme in Scheme::ALL {
            let waveform = modem.modulate(&bits, scheme);
            assert_eq!(modem.demodulate(&waveform, scheme), bits, "{}", scheme);
        }
    }

    #[test]
    fn test_sync_finds_delayed_frame() {
        let modem = modem();
        let bits = test_bits();
        for scheme in Scheme::ALL {
            let mut channel =
                Cable::new(ChannelConfig::ideal().with_delay_samples(37).with_attenuation(0.3))
                    .unwrap();
            let received = channel.transmit(&modem.modulate(&bits, scheme));
            let sync = modem.synchronize(&received, scheme).unwrap();
            assert_eq!(sync.start, 37, "{}", scheme);
            assert_eq!(modem.demodulate(&received, scheme), bits, "{}", scheme);
        }
    }

    #[test]
    fn test_roundtrip_with_noise() {
        let modem = modem();
        let bits = test_bits();
        for scheme in Scheme::ALL {
            let config = ChannelConfig::default()
                .with_attenuation(0.1)
                .with_noise(0.2)
                .with_seed(11);
            let mut channel = Cable::new(config).unwrap();
            let received = channel.transmit(&modem.modulate(&bits, scheme));
            assert_eq!(modem.demodulate(&received, scheme), bits, "{}", scheme);
        }
    }

    #[test]
    fn test_bpsk_polarity_correction() {
        let modem = modem();
        let bits = test_bits();
        let inverted: Vec<Sample> = modem
            .modulate(&bits, Scheme::Bpsk)
            .iter()
            .map(|s| -s)
            .collect();

        let sync = modem.synchronize(&inverted, Scheme::Bpsk).unwrap();
        assert!(sync.is_inverted());
        assert_eq!(modem.demodulate(&inverted, Scheme::Bpsk), bits);
    }

    #[test]
    fn test_fsk_is_phase_insensitive() {
        let modem = modem();
        let bits = test_bits();
        // A phase-shifted carrier still carries the same tone energy
        let shifted: Vec<Sample> = modem
            .modulate(&bits, Scheme::Fsk)
            .iter()
            .map(|s| -0.8 * s)
            .collect();
        assert_eq!(modem.demodulate(&shifted, Scheme::Fsk), bits);
    }

    #[test]
    fn test_sync_failure_yields_empty() {
        let modem = modem();
        for scheme in Scheme::ALL {
            assert!(modem.demodulate(&[], scheme).is_empty());
            assert!(modem.demodulate(&vec![0.0; 400], scheme).is_empty());
            // Shorter than the preamble
            let waveform = modem.modulate(&[1, 0], scheme);
            assert!(modem.demodulate(&waveform[..100], scheme).is_empty());
        }
    }

    #[test]
    fn test_preamble_only_yields_no_bits() {
        let modem = modem();
        let waveform = modem.modulate(&[], Scheme::Ask);
        assert_eq!(waveform.len(), 160);
        assert!(modem.demodulate(&waveform, Scheme::Ask).is_empty());
    }

    #[test]
    fn test_trailing_partial_segment_dropped() {
        let modem = modem();
        let mut waveform = modem.modulate(&[1, 1, 0], Scheme::Ask);
        waveform.extend_from_slice(&[1.0; 7]);
        assert_eq!(modem.demodulate(&waveform, Scheme::Ask), vec![1, 1, 0]);
    }
}
