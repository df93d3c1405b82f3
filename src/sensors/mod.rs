//! Sensor analyzers: per-signal statistics feeding the biometric state.
//!
//! Each analyzer takes already-sampled values, keeps whatever bounded
//! history it needs, and produces a small metrics struct that knows how to
//! merge itself into [`BiometricState`](crate::state::BiometricState).
//! The set of sensor kinds is closed, so dispatch goes through the
//! [`SensorReading`] enum rather than a trait object.

pub mod cardiac;
pub mod dermal;
pub mod neural;
pub mod respiration;

use std::collections::VecDeque;

pub use cardiac::{CardiacAnalyzer, CardiacMetrics, Variability};
pub use dermal::{DermalAnalyzer, DermalMetrics};
pub use neural::{NeuralAnalyzer, NeuralBands, NeuralMetrics};
pub use respiration::{RespirationAnalyzer, RespirationMetrics};

/// One already-sampled sensor value, tagged by source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    /// Instantaneous heart rate in beats per minute.
    HeartRate(f64),
    /// Five EEG band powers.
    Eeg(NeuralBands),
    /// Skin conductance, already scaled to device range.
    SkinConductance(f64),
    /// Instantaneous breathing amplitude, nominally [0, 1].
    Breathing(f64),
}

impl SensorReading {
    pub fn name(&self) -> &'static str {
        match self {
            SensorReading::HeartRate(_) => "heart_rate",
            SensorReading::Eeg(_) => "eeg",
            SensorReading::SkinConductance(_) => "skin_conductance",
            SensorReading::Breathing(_) => "breathing",
        }
    }
}

/// Fixed-capacity FIFO of samples; pushing past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RollingWindow {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Arithmetic mean; `None` for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Sample (n - 1) standard deviation; `None` with fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    // A constant window is exactly zero; the summed mean can be off by an ulp.
    if values.iter().all(|v| *v == values[0]) {
        return Some(0.0);
    }
    let m = mean(values.iter().copied())?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Clamp to [0, 1], mapping NaN to 0.
#[inline]
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}
