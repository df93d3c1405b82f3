//! Neural band analyzer: EEG band powers to cognitive-state indices.

use serde::{Deserialize, Serialize};

use crate::state::BiometricState;

use super::clamp01;

/// Below this `alpha + theta` the attention ratio falls back to 0.5.
const ATTENTION_DENOMINATOR_FLOOR: f64 = 0.01;

/// Relative power of the five EEG bands. Nominally [0, 1], not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NeuralBands {
    /// 0.5–4 Hz
    pub delta: f64,
    /// 4–8 Hz
    pub theta: f64,
    /// 8–13 Hz
    pub alpha: f64,
    /// 13–30 Hz
    pub beta: f64,
    /// 30–100 Hz
    pub gamma: f64,
}

impl NeuralBands {
    pub fn new(delta: f64, theta: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        NeuralBands { delta, theta, alpha, beta, gamma }
    }

    /// Replace non-finite readings with zero.
    fn sanitized(self) -> Self {
        let f = |x: f64| if x.is_finite() { x } else { 0.0 };
        NeuralBands {
            delta: f(self.delta),
            theta: f(self.theta),
            alpha: f(self.alpha),
            beta: f(self.beta),
            gamma: f(self.gamma),
        }
    }
}

/// Cognitive indices, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeuralMetrics {
    pub bands: NeuralBands,
    pub focus: f64,
    pub relaxation: f64,
    pub meditation: f64,
    pub attention: f64,
}

impl NeuralMetrics {
    pub fn apply(&self, state: &mut BiometricState) {
        state.delta = self.bands.delta;
        state.theta = self.bands.theta;
        state.alpha = self.bands.alpha;
        state.beta = self.bands.beta;
        state.gamma = self.bands.gamma;
        state.focus = self.focus;
        state.relaxation = self.relaxation;
        state.meditation = self.meditation;
        state.attention = self.attention;
    }
}

/// Stateless apart from the last result; every reading is analyzed on its own.
#[derive(Debug, Clone, Default)]
pub struct NeuralAnalyzer {
    last: Option<NeuralMetrics>,
}

impl NeuralAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bands: NeuralBands) -> NeuralMetrics {
        let metrics = analyze(bands);
        self.last = Some(metrics);
        metrics
    }

    pub fn last(&self) -> Option<&NeuralMetrics> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Derive the four indices from one set of band powers.
pub fn analyze(bands: NeuralBands) -> NeuralMetrics {
    let b = bands.sanitized();

    let focus = 0.7 * b.beta + 0.3 * (1.0 - b.alpha);
    let relaxation = 0.7 * b.alpha + 0.3 * (1.0 - b.beta);
    let meditation = 0.5 * b.theta + 0.5 * b.alpha;

    let denom = b.alpha + b.theta;
    let attention = if denom < ATTENTION_DENOMINATOR_FLOOR {
        0.5
    } else {
        b.beta / denom
    };

    NeuralMetrics {
        bands: b,
        focus: clamp01(focus),
        relaxation: clamp01(relaxation),
        meditation: clamp01(meditation),
        attention: clamp01(attention),
    }
}
