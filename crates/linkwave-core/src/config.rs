//! Configuration for the modem, channel, ARQ and simulation layers.
//!
//! Every struct deserializes from JSON with missing fields filled from
//! `Default`, so a config file only has to name what it changes:
//!
//! ```json
//! {
//!   "modem": { "scheme": "BPSK" },
//!   "channel": { "noise_sigma": 0.1, "fading": { "scale": 0.9 } },
//!   "arq": { "timeout_interval": 3.0 }
//! }
//! ```
//!
//! Configs are validated when the component that consumes them is built;
//! an invalid value is the only hard error in the crate.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LinkError, Result};
use crate::modem::Scheme;
use crate::types::SimTime;

/// Units of link length per sample of propagation delay.
///
/// Used when [`ChannelConfig::delay_samples`] is not set explicitly.
pub const DELAY_UNITS_PER_SAMPLE: f64 = 10.0;

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(LinkError::Config(message()))
    }
}

/// Physical layer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Samples generated per transmitted bit
    pub samples_per_bit: usize,

    /// Sample rate in samples per second
    pub sample_rate: f64,

    /// Modulation scheme used by endpoints built from this config
    pub scheme: Scheme,

    /// Minimum absolute preamble correlation accepted as a detection
    pub detection_threshold: f64,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            samples_per_bit: 20,
            sample_rate: 1000.0,
            scheme: Scheme::Ask,
            detection_threshold: 1.0,
        }
    }
}

impl ModemConfig {
    /// Builder: set modulation scheme
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Builder: set samples per bit
    pub fn with_samples_per_bit(mut self, samples_per_bit: usize) -> Self {
        self.samples_per_bit = samples_per_bit;
        self
    }

    /// Builder: set sample rate
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Builder: set detection threshold
    pub fn with_detection_threshold(mut self, threshold: f64) -> Self {
        self.detection_threshold = threshold;
        self
    }

    /// Duration of one bit in seconds
    pub fn bit_duration(&self) -> f64 {
        self.samples_per_bit as f64 / self.sample_rate
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ensure(self.samples_per_bit > 0, || {
            "samples_per_bit must be non-zero".into()
        })?;
        ensure(self.sample_rate.is_finite() && self.sample_rate > 0.0, || {
            format!("sample_rate must be positive, got {}", self.sample_rate)
        })?;
        ensure(
            self.detection_threshold.is_finite() && self.detection_threshold > 0.0,
            || {
                format!(
                    "detection_threshold must be positive, got {}",
                    self.detection_threshold
                )
            },
        )
    }
}

/// Multiplicative Rayleigh fading applied once per transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadingConfig {
    /// Rayleigh scale parameter (sigma)
    pub scale: f64,

    /// Lower clamp for the drawn gain
    pub min_gain: f64,

    /// Upper clamp for the drawn gain
    pub max_gain: f64,
}

impl Default for FadingConfig {
    fn default() -> Self {
        Self {
            scale: 0.9,
            min_gain: 0.2,
            max_gain: 1.5,
        }
    }
}

impl FadingConfig {
    /// Fading with the given scale and the default clamp bounds
    pub fn with_scale(scale: f64) -> Self {
        Self {
            scale,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ensure(self.scale.is_finite() && self.scale > 0.0, || {
            format!("fading scale must be positive, got {}", self.scale)
        })?;
        ensure(
            self.min_gain.is_finite() && self.max_gain.is_finite() && self.min_gain >= 0.0,
            || "fading gain bounds must be finite and non-negative".into(),
        )?;
        ensure(self.min_gain <= self.max_gain, || {
            format!(
                "fading min_gain {} exceeds max_gain {}",
                self.min_gain, self.max_gain
            )
        })
    }
}

/// Degradation applied by one directional link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Link length, used to derive the delay when `delay_samples` is unset
    pub length: f64,

    /// Fraction of amplitude lost in transit (0.0 - 1.0)
    pub attenuation: f64,

    /// Standard deviation of additive Gaussian noise
    pub noise_sigma: f64,

    /// Explicit propagation delay in samples
    pub delay_samples: Option<usize>,

    /// Wireless fading stage (wired link when `None`)
    pub fading: Option<FadingConfig>,

    /// RNG seed for reproducible noise and fading
    pub seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            length: 50.0,
            attenuation: 0.0,
            noise_sigma: 0.0,
            delay_samples: None,
            fading: None,
            seed: None,
        }
    }
}

impl ChannelConfig {
    /// A channel with no delay, attenuation, noise or fading
    pub fn ideal() -> Self {
        Self {
            length: 0.0,
            delay_samples: Some(0),
            ..Default::default()
        }
    }

    /// Builder: set link length
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    /// Builder: set attenuation
    pub fn with_attenuation(mut self, attenuation: f64) -> Self {
        self.attenuation = attenuation;
        self
    }

    /// Builder: set noise standard deviation
    pub fn with_noise(mut self, sigma: f64) -> Self {
        self.noise_sigma = sigma;
        self
    }

    /// Builder: set explicit delay in samples
    pub fn with_delay_samples(mut self, delay: usize) -> Self {
        self.delay_samples = Some(delay);
        self
    }

    /// Builder: add a fading stage
    pub fn with_fading(mut self, fading: FadingConfig) -> Self {
        self.fading = Some(fading);
        self
    }

    /// Builder: set RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Propagation delay in samples, derived from the length if not set
    pub fn resolved_delay_samples(&self) -> usize {
        self.delay_samples
            .unwrap_or_else(|| (self.length / DELAY_UNITS_PER_SAMPLE).round() as usize)
    }

    /// Whether this link applies fading
    pub fn is_wireless(&self) -> bool {
        self.fading.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ensure(self.length.is_finite() && self.length >= 0.0, || {
            format!("length must be non-negative, got {}", self.length)
        })?;
        ensure((0.0..=1.0).contains(&self.attenuation), || {
            format!("attenuation must be within [0, 1], got {}", self.attenuation)
        })?;
        ensure(self.noise_sigma.is_finite() && self.noise_sigma >= 0.0, || {
            format!("noise_sigma must be non-negative, got {}", self.noise_sigma)
        })?;
        if let Some(fading) = &self.fading {
            fading.validate()?;
        }
        Ok(())
    }
}

/// Stop-and-wait ARQ parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArqConfig {
    /// Seconds without an ACK before a pending frame is retransmitted
    pub timeout_interval: SimTime,

    /// Retransmissions allowed per frame before giving up (unbounded when `None`)
    pub max_retransmissions: Option<u32>,

    /// Sequence numbers remembered per source for duplicate suppression
    pub dedup_window: usize,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            timeout_interval: 3.0,
            max_retransmissions: None,
            dedup_window: 128,
        }
    }
}

impl ArqConfig {
    /// Builder: set timeout interval
    pub fn with_timeout(mut self, timeout_interval: SimTime) -> Self {
        self.timeout_interval = timeout_interval;
        self
    }

    /// Builder: bound the number of retransmissions
    pub fn with_max_retransmissions(mut self, limit: u32) -> Self {
        self.max_retransmissions = Some(limit);
        self
    }

    /// Builder: set duplicate suppression window
    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ensure(
            self.timeout_interval.is_finite() && self.timeout_interval > 0.0,
            || {
                format!(
                    "timeout_interval must be positive, got {}",
                    self.timeout_interval
                )
            },
        )?;
        ensure(self.max_retransmissions != Some(0), || {
            "max_retransmissions must be at least 1 when set".into()
        })?;
        // The window must stay below the 8-bit sequence space or a wrapped
        // sequence number would never be delivered again.
        ensure((1..=255).contains(&self.dedup_window), || {
            format!("dedup_window must be within 1..=255, got {}", self.dedup_window)
        })
    }
}

/// Simulation driver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seconds a frame spends in flight on a link
    pub propagation_delay: SimTime,

    /// Run the ARQ timeout check on every node at this period
    pub timeout_check_interval: Option<SimTime>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            propagation_delay: 0.5,
            timeout_check_interval: None,
        }
    }
}

impl SimConfig {
    /// Builder: set propagation delay
    pub fn with_propagation_delay(mut self, delay: SimTime) -> Self {
        self.propagation_delay = delay;
        self
    }

    /// Builder: enable periodic timeout checks
    pub fn with_timeout_check_interval(mut self, interval: SimTime) -> Self {
        self.timeout_check_interval = Some(interval);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ensure(
            self.propagation_delay.is_finite() && self.propagation_delay >= 0.0,
            || {
                format!(
                    "propagation_delay must be non-negative, got {}",
                    self.propagation_delay
                )
            },
        )?;
        if let Some(interval) = self.timeout_check_interval {
            ensure(interval.is_finite() && interval > 0.0, || {
                format!("timeout_check_interval must be positive, got {}", interval)
            })?;
        }
        Ok(())
    }
}

/// Complete configuration for a simulated link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Physical layer
    pub modem: ModemConfig,

    /// Channel degradation
    pub channel: ChannelConfig,

    /// Reliable delivery
    pub arq: ArqConfig,

    /// Simulation driver
    pub simulation: SimConfig,
}

impl LinkConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LinkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.modem.validate()?;
        self.channel.validate()?;
        self.arq.validate()?;
        self.simulation.validate()
    }
}
