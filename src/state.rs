//! Biometric state: the combined snapshot every analyzer writes into.
//!
//! The aggregator is the only writer. Readers (mapper, protocol bridge, UI)
//! receive `Copy` snapshots through [`SharedState`], so a reader either sees
//! the previous complete state or the next complete state, never a mix.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Which half of the breath cycle the respiration analyzer last detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreathPhase {
    Inhale,
    #[default]
    Exhale,
}

/// Combined output of all four analyzers.
///
/// Raw sensor fields (`heart_rate`, the EEG bands, `skin_conductance`) are
/// stored as received. Derived fields are always clamped to their documented
/// range before they land here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BiometricState {
    // ── Cardiac ──
    /// Beats per minute.
    pub heart_rate: f64,
    /// Reported HRV in ms (equal to `rmssd`).
    pub hrv: f64,
    pub rmssd: f64,
    pub sdnn: f64,
    /// Percentage [0, 100].
    pub pnn50: f64,
    /// Threshold proxy, not a spectral LF/HF ratio.
    pub lf_hf_ratio: f64,

    // ── Neural ──
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub focus: f64,
    pub relaxation: f64,
    pub meditation: f64,
    pub attention: f64,

    // ── Dermal ──
    pub skin_conductance: f64,
    /// Rolling standard deviation of skin conductance, >= 0.
    pub stress_index: f64,
    pub arousal: f64,

    // ── Respiration ──
    /// Breaths per minute.
    pub breathing_rate: f64,
    /// Peak-to-trough swing of the last cycle [0, 1].
    pub breathing_depth: f64,
    pub inhaling: bool,
    pub breath_phase: BreathPhase,
    /// 0.8 inside the resonant band, 0.4 outside.
    pub coherence: f64,

    // ── Bookkeeping ──
    /// Incremented on every published update.
    pub sequence: u64,
    /// Seconds since the aggregator was created.
    pub timestamp_secs: f64,
}

impl Default for BiometricState {
    fn default() -> Self {
        BiometricState {
            heart_rate: 70.0,
            hrv: 0.0,
            rmssd: 0.0,
            sdnn: 0.0,
            pnn50: 0.0,
            lf_hf_ratio: 1.0,
            delta: 0.0,
            theta: 0.0,
            alpha: 0.0,
            beta: 0.0,
            gamma: 0.0,
            focus: 0.5,
            relaxation: 0.5,
            meditation: 0.0,
            attention: 0.5,
            skin_conductance: 0.0,
            stress_index: 0.0,
            arousal: 0.0,
            breathing_rate: 12.0,
            breathing_depth: 0.5,
            inhaling: false,
            breath_phase: BreathPhase::Exhale,
            coherence: 0.4,
            sequence: 0,
            timestamp_secs: 0.0,
        }
    }
}

/// Single-writer / multi-reader handle onto the published state.
///
/// Cloning the handle shares the same underlying snapshot.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<BiometricState>>,
}

impl SharedState {
    pub fn new(initial: BiometricState) -> Self {
        SharedState {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Replace the published state in one assignment.
    pub(crate) fn publish(&self, next: BiometricState) {
        *self.inner.write() = next;
    }

    /// Copy out the current state, waiting for a writer if one holds the lock.
    pub fn snapshot(&self) -> BiometricState {
        *self.inner.read()
    }

    /// Copy out the current state without blocking.
    ///
    /// Returns `None` while a writer is publishing; real-time callers reuse
    /// their previous snapshot in that case.
    pub fn try_snapshot(&self) -> Option<BiometricState> {
        self.inner.try_read().map(|guard| *guard)
    }
}
