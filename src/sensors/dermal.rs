//! Dermal response analyzer: skin conductance to a variance-based stress index.

use tracing::trace;

use crate::state::BiometricState;

use super::{sample_std_dev, RollingWindow};

pub const WINDOW_CAPACITY: usize = 100;

/// Below this many samples the stress index is reported as 0.
pub const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DermalMetrics {
    /// Latest raw conductance.
    pub skin_conductance: f64,
    /// Sample standard deviation of the window, >= 0.
    pub stress_index: f64,
    /// Latest raw sample, reported as arousal.
    pub arousal: f64,
}

impl DermalMetrics {
    pub fn apply(&self, state: &mut BiometricState) {
        state.skin_conductance = self.skin_conductance;
        state.stress_index = self.stress_index;
        state.arousal = self.arousal;
    }
}

#[derive(Debug, Clone)]
pub struct DermalAnalyzer {
    window: RollingWindow,
    scratch: Vec<f64>,
}

impl Default for DermalAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DermalAnalyzer {
    pub fn new() -> Self {
        DermalAnalyzer {
            window: RollingWindow::new(WINDOW_CAPACITY),
            scratch: Vec::with_capacity(WINDOW_CAPACITY),
        }
    }

    /// Feed one conductance sample. Non-finite samples are dropped.
    pub fn update(&mut self, conductance: f64) -> Option<DermalMetrics> {
        if !conductance.is_finite() {
            trace!(conductance, "rejected skin-conductance sample");
            return None;
        }
        self.window.push(conductance);

        let stress_index = if self.window.len() < MIN_SAMPLES {
            0.0
        } else {
            self.scratch.clear();
            self.scratch.extend(self.window.iter());
            sample_std_dev(&self.scratch).unwrap_or(0.0)
        };

        Some(DermalMetrics {
            skin_conductance: conductance,
            stress_index,
            arousal: conductance,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
