//! Preamble synchronization by cross-correlation
//!
//! The receiver slides the known preamble waveform across the received
//! samples and takes the lag with the largest absolute correlation as the
//! frame start. The sign of that peak is kept: a negative peak means the
//! receiver locked onto an inverted copy of the preamble, which coherent
//! schemes must correct for.

use crate::types::Sample;

/// Location of a detected preamble
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncResult {
    /// Sample index where the preamble starts
    pub start: usize,
    /// Signed correlation at `start`
    pub peak: f64,
}

impl SyncResult {
    /// Whether the preamble was received with inverted polarity
    pub fn is_inverted(&self) -> bool {
        self.peak < 0.0
    }
}

/// Correlation of `reference` against every full-overlap lag of `signal`
///
/// Output length is `signal.len() - reference.len() + 1`, or zero when the
/// signal is shorter than the reference.
pub fn cross_correlate(signal: &[Sample], reference: &[Sample]) -> Vec<f64> {
    if reference.is_empty() || signal.len() < reference.len() {
        return Vec::new();
    }
    signal
        .windows(reference.len())
        .map(|window| dot(window, reference))
        .collect()
}

/// Find the preamble in `signal`
///
/// Returns `None` when the signal is shorter than the reference or when the
/// strongest correlation magnitude is below `threshold`. Ties go to the
/// earliest lag.
pub fn locate_preamble(
    signal: &[Sample],
    reference: &[Sample],
    threshold: f64,
) -> Option<SyncResult> {
    if reference.is_empty() || signal.len() < reference.len() {
        return None;
    }

    let mut best: Option<SyncResult> = None;
    for (start, window) in signal.windows(reference.len()).enumerate() {
        let peak = dot(window, reference);
        if best.map_or(true, |b| peak.abs() > b.peak.abs()) {
            best = Some(SyncResult { start, peak });
        }
    }

    best.filter(|b| b.peak.abs() >= threshold)
}

/// Inner product of two equal-length sample slices
pub fn dot(a: &[Sample], b: &[Sample]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
