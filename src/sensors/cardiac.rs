//! Cardiac analyzer: heart rate to inter-beat intervals and HRV statistics.

use tracing::trace;

use crate::state::BiometricState;

use super::{sample_std_dev, RollingWindow};

/// Inter-beat intervals kept for the variability statistics.
pub const INTERVAL_CAPACITY: usize = 60;

/// Successive differences larger than this count toward pNN50 (ms).
const NN50_THRESHOLD_MS: f64 = 50.0;

/// Heart rate above which the LF/HF proxy reports sympathetic dominance.
const LF_HF_BPM_THRESHOLD: f64 = 100.0;

/// Variability statistics over the interval history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variability {
    /// Root mean square of successive differences (ms).
    pub rmssd: f64,
    /// Sample standard deviation of the intervals (ms).
    pub sdnn: f64,
    /// Percentage of successive differences above 50 ms.
    pub pnn50: f64,
}

/// Output of one accepted heart-rate sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardiacMetrics {
    pub heart_rate: f64,
    /// Placeholder for a spectral LF/HF ratio: 2.0 above 100 bpm, else 1.0.
    pub lf_hf_ratio: f64,
    /// `None` until at least two intervals exist.
    pub variability: Option<Variability>,
}

impl CardiacMetrics {
    /// Merge into the state. Variability fields keep their previous values
    /// when this update carried none.
    pub fn apply(&self, state: &mut BiometricState) {
        state.heart_rate = self.heart_rate;
        state.lf_hf_ratio = self.lf_hf_ratio;
        if let Some(v) = self.variability {
            state.rmssd = v.rmssd;
            state.hrv = v.rmssd;
            state.sdnn = v.sdnn;
            state.pnn50 = v.pnn50;
        }
    }
}

#[derive(Debug, Clone)]
pub struct CardiacAnalyzer {
    intervals: RollingWindow,
    // Scratch copy of the window, reused so updates stay allocation-free.
    scratch: Vec<f64>,
}

impl Default for CardiacAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl CardiacAnalyzer {
    pub fn new() -> Self {
        CardiacAnalyzer {
            intervals: RollingWindow::new(INTERVAL_CAPACITY),
            scratch: Vec::with_capacity(INTERVAL_CAPACITY),
        }
    }

    /// Feed one heart-rate sample.
    ///
    /// Returns `None` (and changes nothing) for non-positive or non-finite
    /// input.
    pub fn update(&mut self, bpm: f64) -> Option<CardiacMetrics> {
        if !bpm.is_finite() || bpm <= 0.0 {
            trace!(bpm, "rejected heart-rate sample");
            return None;
        }

        self.intervals.push(60_000.0 / bpm);

        let lf_hf_ratio = if bpm > LF_HF_BPM_THRESHOLD { 2.0 } else { 1.0 };

        Some(CardiacMetrics {
            heart_rate: bpm,
            lf_hf_ratio,
            variability: self.variability(),
        })
    }

    fn variability(&mut self) -> Option<Variability> {
        if self.intervals.len() < 2 {
            return None;
        }

        self.scratch.clear();
        self.scratch.extend(self.intervals.iter());

        let diff_count = self.scratch.len() - 1;
        let (sum_sq, nn50) = self.scratch.windows(2).fold((0.0, 0usize), |(sq, n), w| {
            let d = (w[1] - w[0]).abs();
            (sq + d * d, n + usize::from(d > NN50_THRESHOLD_MS))
        });

        Some(Variability {
            rmssd: (sum_sq / diff_count as f64).sqrt(),
            sdnn: sample_std_dev(&self.scratch).unwrap_or(0.0),
            pnn50: nn50 as f64 / diff_count as f64 * 100.0,
        })
    }

    /// Intervals currently held, oldest first (ms).
    pub fn intervals(&self) -> impl Iterator<Item = f64> + '_ {
        self.intervals.iter()
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn reset(&mut self) {
        self.intervals.clear();
    }
}
