//! Channel degradation models
//!
//! A channel is a pipeline of degradation stages applied to a waveform in
//! transit. The wired stage ([`Cable`]) models propagation delay, attenuation
//! and additive white Gaussian noise. The wireless stage ([`FadingChannel`])
//! wraps any other stage and multiplies its output by one Rayleigh-distributed
//! gain per transmission.
//!
//! ```text
//! wired:     waveform → [delay] → [× (1 - attenuation)] → [+ N(0, σ²)] → waveform
//! wireless:  waveform → Cable ─────────────────────────────────────────→ [× g] → waveform
//!                                             g ~ Rayleigh(scale), clamped
//! ```
//!
//! Each stage owns a ChaCha8 RNG, so a seeded config reproduces the same
//! noise and fading on every run.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Weibull};
use std::fmt::Debug;

use crate::config::{ChannelConfig, FadingConfig};
use crate::error::{LinkError, Result};
use crate::types::Sample;

/// RNG stream offset separating the fading stage from the noise stage
const FADING_STREAM: u64 = 1 << 32;

/// A stage that degrades a waveform in transit.
///
/// Implementations never fail; an empty input yields an empty output.
pub trait Degradation: Debug + Send {
    /// Apply the degradation and return the received waveform
    fn transmit(&mut self, waveform: &[Sample]) -> Vec<Sample>;
}

impl<D: Degradation + ?Sized> Degradation for Box<D> {
    fn transmit(&mut self, waveform: &[Sample]) -> Vec<Sample> {
        (**self).transmit(waveform)
    }
}

fn stage_rng(seed: Option<u64>, stream: u64) -> ChaCha8Rng {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    rng.set_stream(stream);
    rng
}

/// Wired link: delay, attenuation and additive Gaussian noise
#[derive(Debug)]
pub struct Cable {
    config: ChannelConfig,
    delay_samples: usize,
    gain: f64,
    noise: Option<Normal<f64>>,
    rng: ChaCha8Rng,
}

impl Cable {
    /// Create a cable from a validated config
    pub fn new(config: ChannelConfig) -> Result<Self> {
        Self::with_stream(config, 0)
    }

    /// Create a cable drawing noise from the given RNG stream
    ///
    /// Two cables built from the same seeded config but different streams
    /// produce independent noise.
    pub fn with_stream(config: ChannelConfig, stream: u64) -> Result<Self> {
        config.validate()?;

        let noise = if config.noise_sigma > 0.0 {
            let normal = Normal::new(0.0, config.noise_sigma)
                .map_err(|e| LinkError::Config(format!("noise distribution: {}", e)))?;
            Some(normal)
        } else {
            None
        };

        Ok(Self {
            delay_samples: config.resolved_delay_samples(),
            gain: 1.0 - config.attenuation,
            noise,
            rng: stage_rng(config.seed, stream),
            config,
        })
    }

    /// The config this cable was built from
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Propagation delay in samples
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }
}

impl Degradation for Cable {
    fn transmit(&mut self, waveform: &[Sample]) -> Vec<Sample> {
        if waveform.is_empty() {
            return Vec::new();
        }

        let mut received = Vec::with_capacity(self.delay_samples + waveform.len());
        received.resize(self.delay_samples, 0.0);
        received.extend(waveform.iter().map(|s| s * self.gain));

        if let Some(noise) = &self.noise {
            for sample in received.iter_mut() {
                *sample += noise.sample(&mut self.rng);
            }
        }

        received
    }
}

/// Wireless stage: one clamped Rayleigh gain per transmission
///
/// Wraps an inner stage rather than extending it, so fading composes with
/// any other [`Degradation`].
#[derive(Debug)]
pub struct FadingChannel<D> {
    inner: D,
    config: FadingConfig,
    distribution: Weibull<f64>,
    rng: ChaCha8Rng,
    last_gain: Option<f64>,
}

impl<D: Degradation> FadingChannel<D> {
    /// Wrap `inner` with a fading stage
    pub fn new(inner: D, config: FadingConfig, seed: Option<u64>) -> Result<Self> {
        Self::with_stream(inner, config, seed, FADING_STREAM)
    }

    fn with_stream(inner: D, config: FadingConfig, seed: Option<u64>, stream: u64) -> Result<Self> {
        config.validate()?;

        // Rayleigh(σ) is Weibull with shape 2 and scale σ√2
        let distribution = Weibull::new(config.scale * std::f64::consts::SQRT_2, 2.0)
            .map_err(|e| LinkError::Config(format!("fading distribution: {:?}", e)))?;

        Ok(Self {
            inner,
            config,
            distribution,
            rng: stage_rng(seed, stream),
            last_gain: None,
        })
    }

    /// Draw one fading gain, clamped to the configured bounds
    pub fn draw_gain(&mut self) -> f64 {
        self.distribution
            .sample(&mut self.rng)
            .clamp(self.config.min_gain, self.config.max_gain)
    }

    /// Gain applied to the most recent transmission
    pub fn last_gain(&self) -> Option<f64> {
        self.last_gain
    }

    /// The wrapped stage
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Degradation> Degradation for FadingChannel<D> {
    fn transmit(&mut self, waveform: &[Sample]) -> Vec<Sample> {
        let mut received = self.inner.transmit(waveform);
        let gain = self.draw_gain();
        self.last_gain = Some(gain);
        for sample in received.iter_mut() {
            *sample *= gain;
        }
        received
    }
}

/// Build the degradation pipeline described by `config`
///
/// `stream` selects independent RNG streams for links sharing one seeded
/// config (for example the two directions of a duplex link).
pub fn build_channel(config: &ChannelConfig, stream: u64) -> Result<Box<dyn Degradation>> {
    let cable = Cable::with_stream(config.clone(), stream)?;
    match &config.fading {
        Some(fading) => {
            let faded = FadingChannel::with_stream(
                cable,
                fading.clone(),
                config.seed,
                FADING_STREAM + stream,
            )?;
            Ok(Box::new(faded))
        }
        None => Ok(Box::new(cable)),
    }
}
