//! Respiration analyzer: breathing amplitude to rate, depth, phase and coherence.
//!
//! Breath cycles are edge-detected with hysteresis: rising above
//! [`INHALE_THRESHOLD`] starts an inhale, falling below
//! [`EXHALE_THRESHOLD`] ends it. The rate comes from wall-clock time
//! between successive inhale starts.

use std::time::Instant;

use tracing::trace;

use crate::state::{BiometricState, BreathPhase};

use super::clamp01;

pub const INHALE_THRESHOLD: f64 = 0.5;
pub const EXHALE_THRESHOLD: f64 = 0.3;

/// Resonant-breathing band (breaths per minute, inclusive).
pub const RESONANT_BAND: (f64, f64) = (5.0, 7.0);
pub const COHERENT_SCORE: f64 = 0.8;
pub const INCOHERENT_SCORE: f64 = 0.4;

/// Inhale starts closer together than this are treated as the same breath.
const MIN_BREATH_SECS: f64 = 1e-3;

/// Coherence for a given breathing rate.
pub fn coherence_for_rate(rate: f64) -> f64 {
    if (RESONANT_BAND.0..=RESONANT_BAND.1).contains(&rate) {
        COHERENT_SCORE
    } else {
        INCOHERENT_SCORE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RespirationMetrics {
    pub inhaling: bool,
    pub phase: BreathPhase,
    /// True when this sample started a new inhale.
    pub breath_started: bool,
    /// Latest known rate; `None` until two inhales have been seen.
    pub rate: Option<f64>,
    pub coherence: Option<f64>,
    /// Swing of the last completed cycle; `None` until one completes.
    pub depth: Option<f64>,
}

impl RespirationMetrics {
    pub fn apply(&self, state: &mut BiometricState) {
        state.inhaling = self.inhaling;
        state.breath_phase = self.phase;
        if let Some(rate) = self.rate {
            state.breathing_rate = rate;
        }
        if let Some(c) = self.coherence {
            state.coherence = c;
        }
        if let Some(d) = self.depth {
            state.breathing_depth = d;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RespirationAnalyzer {
    inhaling: bool,
    last_inhale_at: Option<Instant>,
    rate: Option<f64>,
    depth: Option<f64>,
    cycle_min: Option<f64>,
    cycle_max: Option<f64>,
}

impl RespirationAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one amplitude sample observed at `now`.
    pub fn update(&mut self, amplitude: f64, now: Instant) -> Option<RespirationMetrics> {
        if !amplitude.is_finite() {
            trace!(amplitude, "rejected breathing sample");
            return None;
        }

        let mut breath_started = false;

        if !self.inhaling && amplitude > INHALE_THRESHOLD {
            self.inhaling = true;
            breath_started = true;
            self.on_inhale_start(now);
        } else if self.inhaling && amplitude < EXHALE_THRESHOLD {
            self.inhaling = false;
        }

        self.cycle_min = Some(self.cycle_min.map_or(amplitude, |m| m.min(amplitude)));
        self.cycle_max = Some(self.cycle_max.map_or(amplitude, |m| m.max(amplitude)));

        Some(RespirationMetrics {
            inhaling: self.inhaling,
            phase: if self.inhaling { BreathPhase::Inhale } else { BreathPhase::Exhale },
            breath_started,
            rate: self.rate,
            coherence: self.rate.map(coherence_for_rate),
            depth: self.depth,
        })
    }

    fn on_inhale_start(&mut self, now: Instant) {
        if let Some(prev) = self.last_inhale_at {
            let elapsed = now.saturating_duration_since(prev).as_secs_f64();
            if elapsed >= MIN_BREATH_SECS {
                self.rate = Some(60.0 / elapsed);
            }
            // A full trough-to-peak cycle has been observed since the
            // previous inhale start.
            if let (Some(lo), Some(hi)) = (self.cycle_min, self.cycle_max) {
                self.depth = Some(clamp01(hi - lo));
            }
        }
        self.last_inhale_at = Some(now);
        self.cycle_min = None;
        self.cycle_max = None;
    }

    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    pub fn is_inhaling(&self) -> bool {
        self.inhaling
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
