//! Calibration: per-user baseline recording and the resulting range profile.
//!
//! A session records biometric snapshots for a fixed window and then
//! commits a new [`CalibrationProfile`]. The window is wall-clock driven and
//! checked whenever the aggregator feeds a snapshot; there is no timer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::error::{BioResult, ProfileError};
use crate::sensors::mean;
use crate::state::BiometricState;

/// Length of a calibration session.
pub const CALIBRATION_WINDOW: Duration = Duration::from_secs(60);

const HRV_LOW_SCALE: f64 = 0.8;
const HRV_HIGH_SCALE: f64 = 1.5;

// ── Profile ─────────────────────────────────────────────────

/// Per-user baseline used to normalize readings.
///
/// Deserializing goes through the same per-field fallback as
/// [`from_record`](Self::from_record), so numbers and numeric strings are
/// both accepted and one bad field never rejects the whole profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationProfile {
    pub name: String,
    /// Lower HRV bound (ms).
    pub hrv_low: f64,
    /// Upper HRV bound (ms).
    pub hrv_high: f64,
    pub alpha_baseline: f64,
    /// Baseline of the dermal stress index.
    pub gsr_baseline: f64,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        CalibrationProfile {
            name: "Default".to_string(),
            hrv_low: 20.0,
            hrv_high: 100.0,
            alpha_baseline: 0.5,
            gsr_baseline: 0.0,
        }
    }
}

const KEY_NAME: &str = "name";
const KEY_HRV_LOW: &str = "hrv_low";
const KEY_HRV_HIGH: &str = "hrv_high";
const KEY_ALPHA: &str = "alpha_baseline";
const KEY_GSR: &str = "gsr_baseline";

impl CalibrationProfile {
    /// Flat key/value form for persistence.
    pub fn to_record(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (KEY_NAME.to_string(), self.name.clone()),
            (KEY_HRV_LOW.to_string(), self.hrv_low.to_string()),
            (KEY_HRV_HIGH.to_string(), self.hrv_high.to_string()),
            (KEY_ALPHA.to_string(), self.alpha_baseline.to_string()),
            (KEY_GSR.to_string(), self.gsr_baseline.to_string()),
        ])
    }

    /// Rebuild from a flat record. Each missing or unparsable field falls
    /// back to its default on its own.
    pub fn from_record(record: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, fallback: f64| -> f64 {
            match record.get(key).map(|raw| raw.trim().parse::<f64>()) {
                Some(Ok(v)) if v.is_finite() => v,
                Some(_) => {
                    warn!(key, "malformed calibration field, using default");
                    fallback
                }
                None => fallback,
            }
        };

        CalibrationProfile {
            name: record
                .get(KEY_NAME)
                .filter(|n| !n.trim().is_empty())
                .cloned()
                .unwrap_or(defaults.name),
            hrv_low: number(KEY_HRV_LOW, defaults.hrv_low),
            hrv_high: number(KEY_HRV_HIGH, defaults.hrv_high),
            alpha_baseline: number(KEY_ALPHA, defaults.alpha_baseline),
            gsr_baseline: number(KEY_GSR, defaults.gsr_baseline),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::Value::Object(
            self.to_record()
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect(),
        )
        .to_string()
    }

    /// Parse the JSON record. Fails only if the text is not a JSON object;
    /// individual fields still fall back to defaults.
    pub fn from_json(json: &str) -> BioResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(ProfileError::from)?;
        Ok(Self::from_value(&value))
    }

    /// Like [`from_json`](Self::from_json) but never fails; unreadable text
    /// yields the default profile.
    pub fn from_json_lenient(json: &str) -> Self {
        match Self::from_json(json) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "unreadable calibration record, using defaults");
                Self::default()
            }
        }
    }

    fn from_value(value: &serde_json::Value) -> Self {
        let record: BTreeMap<String, String> = value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| {
                        let text = match v {
                            serde_json::Value::String(s) => s.clone(),
                            serde_json::Value::Number(n) => n.to_string(),
                            _ => return None,
                        };
                        Some((k.clone(), text))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self::from_record(&record)
    }
}

impl<'de> Deserialize<'de> for CalibrationProfile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

// ── Engine ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    Idle,
    Recording,
}

/// What happened when a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    /// A new profile was computed and is now current.
    Committed(Arc<CalibrationProfile>),
    /// The session ended without snapshots; the profile is unchanged.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    profile: Arc<CalibrationProfile>,
    status: CalibrationStatus,
    started_at: Option<Instant>,
    samples: Vec<BiometricState>,
    window: Duration,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(CalibrationProfile::default())
    }
}

impl CalibrationEngine {
    pub fn new(profile: CalibrationProfile) -> Self {
        CalibrationEngine {
            profile: Arc::new(profile),
            status: CalibrationStatus::Idle,
            started_at: None,
            samples: Vec::new(),
            window: CALIBRATION_WINDOW,
        }
    }

    /// Override the session length.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Current profile, shared by reference.
    pub fn profile(&self) -> &Arc<CalibrationProfile> {
        &self.profile
    }

    /// Replace the profile outright, e.g. after loading it from storage.
    pub fn set_profile(&mut self, profile: CalibrationProfile) {
        self.profile = Arc::new(profile);
    }

    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.status == CalibrationStatus::Recording
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Fraction of the window elapsed, 0 when idle.
    pub fn progress(&self, now: Instant) -> f64 {
        match (self.status, self.started_at) {
            (CalibrationStatus::Recording, Some(start)) if !self.window.is_zero() => {
                let elapsed = now.saturating_duration_since(start).as_secs_f64();
                (elapsed / self.window.as_secs_f64()).min(1.0)
            }
            (CalibrationStatus::Recording, _) => 1.0,
            _ => 0.0,
        }
    }

    /// Begin (or restart) a session.
    pub fn start(&mut self, now: Instant) {
        self.status = CalibrationStatus::Recording;
        self.started_at = Some(now);
        self.samples.clear();
        info!(window_secs = self.window.as_secs_f64(), "calibration started");
    }

    /// Offer a snapshot. Records it while the window is open, and ends the
    /// session once the window has elapsed.
    pub fn record(&mut self, state: &BiometricState, now: Instant) -> Option<CalibrationOutcome> {
        let start = match (self.status, self.started_at) {
            (CalibrationStatus::Recording, Some(start)) => start,
            _ => return None,
        };

        if now.saturating_duration_since(start) < self.window {
            self.samples.push(*state);
            None
        } else {
            self.finish()
        }
    }

    /// End the session now. Returns `None` if no session was running.
    pub fn finish(&mut self) -> Option<CalibrationOutcome> {
        if self.status != CalibrationStatus::Recording {
            return None;
        }
        self.status = CalibrationStatus::Idle;
        self.started_at = None;

        let outcome = match self.compute_profile() {
            Some(profile) => {
                info!(
                    samples = self.samples.len(),
                    hrv_low = profile.hrv_low,
                    hrv_high = profile.hrv_high,
                    alpha_baseline = profile.alpha_baseline,
                    gsr_baseline = profile.gsr_baseline,
                    "calibration committed"
                );
                self.profile = Arc::new(profile);
                CalibrationOutcome::Committed(Arc::clone(&self.profile))
            }
            None => {
                info!("calibration ended without samples, profile unchanged");
                CalibrationOutcome::Skipped
            }
        };
        self.samples.clear();
        Some(outcome)
    }

    fn compute_profile(&self) -> Option<CalibrationProfile> {
        let alpha = mean(self.samples.iter().map(|s| s.alpha))?;
        let stress = mean(self.samples.iter().map(|s| s.stress_index))?;

        // HRV stays 0 until two beats have been seen; without any cardiac
        // variability in the session the previous bounds are kept.
        let (hrv_low, hrv_high) = match mean(self.samples.iter().map(|s| s.hrv).filter(|h| *h > 0.0)) {
            Some(hrv) => (HRV_LOW_SCALE * hrv, HRV_HIGH_SCALE * hrv),
            None => {
                info!("no heart-rate variability recorded, keeping HRV bounds");
                (self.profile.hrv_low, self.profile.hrv_high)
            }
        };

        Some(CalibrationProfile {
            name: self.profile.name.clone(),
            hrv_low,
            hrv_high,
            alpha_baseline: alpha,
            gsr_baseline: stress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(hrv: f64, alpha: f64, stress: f64) -> BiometricState {
        BiometricState {
            hrv,
            alpha,
            stress_index: stress,
            ..BiometricState::default()
        }
    }

    #[test]
    fn commits_means_after_window() {
        let mut engine = CalibrationEngine::default();
        let t0 = Instant::now();
        engine.start(t0);
        assert!(engine.is_recording());

        assert!(engine.record(&state(40.0, 0.4, 0.1), t0 + Duration::from_secs(10)).is_none());
        assert!(engine.record(&state(60.0, 0.6, 0.3), t0 + Duration::from_secs(30)).is_none());
        assert!((engine.progress(t0 + Duration::from_secs(30)) - 0.5).abs() < 1e-12);

        let outcome = engine.record(&state(0.0, 0.0, 0.0), t0 + CALIBRATION_WINDOW);
        let Some(CalibrationOutcome::Committed(p)) = outcome else {
            panic!("expected commit, got {outcome:?}");
        };
        assert!((p.hrv_low - 40.0).abs() < 1e-9);
        assert!((p.hrv_high - 75.0).abs() < 1e-9);
        assert!((p.alpha_baseline - 0.5).abs() < 1e-12);
        assert!((p.gsr_baseline - 0.2).abs() < 1e-12);
        assert_eq!(p.name, "Default");
        assert_eq!(engine.status(), CalibrationStatus::Idle);
        assert_eq!(engine.profile(), &p);
    }

    #[test]
    fn forced_finish_without_samples_leaves_profile_untouched() {
        let original = CalibrationProfile {
            name: "Ada".into(),
            hrv_low: 31.5,
            hrv_high: 88.25,
            alpha_baseline: 0.42,
            gsr_baseline: 0.07,
        };
        let mut engine = CalibrationEngine::new(original.clone());
        engine.start(Instant::now());
        assert_eq!(engine.finish(), Some(CalibrationOutcome::Skipped));
        assert_eq!(**engine.profile(), original);
        assert_eq!(engine.profile().hrv_low.to_bits(), original.hrv_low.to_bits());
    }

    #[test]
    fn session_without_heart_data_keeps_hrv_bounds() {
        let mut engine = CalibrationEngine::default();
        let t0 = Instant::now();
        engine.start(t0);
        engine.record(&state(0.0, 0.8, 0.1), t0);
        engine.record(&state(0.0, 0.6, 0.3), t0 + Duration::from_secs(5));

        let Some(CalibrationOutcome::Committed(p)) = engine.finish() else {
            panic!("expected commit");
        };
        let d = CalibrationProfile::default();
        assert_eq!(p.hrv_low, d.hrv_low);
        assert_eq!(p.hrv_high, d.hrv_high);
        assert!((p.alpha_baseline - 0.7).abs() < 1e-12);
    }

    #[test]
    fn hrv_warm_up_snapshots_are_ignored() {
        let mut engine = CalibrationEngine::default();
        let t0 = Instant::now();
        engine.start(t0);
        engine.record(&state(0.0, 0.5, 0.0), t0);
        engine.record(&state(50.0, 0.5, 0.0), t0);
        let Some(CalibrationOutcome::Committed(p)) = engine.finish() else {
            panic!("expected commit");
        };
        assert!((p.hrv_low - 40.0).abs() < 1e-9);
        assert!((p.hrv_high - 75.0).abs() < 1e-9);
    }

    #[test]
    fn serde_deserialize_falls_back_per_field() {
        let p: CalibrationProfile = serde_json::from_str(r#"{"name": "Lin", "hrv_low": "abc", "hrv_high": "90"}"#).unwrap();
        assert_eq!(p.name, "Lin");
        assert_eq!(p.hrv_low, CalibrationProfile::default().hrv_low);
        assert_eq!(p.hrv_high, 90.0);

        let p: CalibrationProfile = serde_json::from_str("42").unwrap();
        assert_eq!(p, CalibrationProfile::default());
    }

    #[test]
    fn idle_engine_ignores_snapshots() {
        let mut engine = CalibrationEngine::default();
        assert!(engine.record(&state(50.0, 0.5, 0.0), Instant::now()).is_none());
        assert_eq!(engine.sample_count(), 0);
        assert!(engine.finish().is_none());
        assert_eq!(engine.progress(Instant::now()), 0.0);
    }

    #[test]
    fn restart_clears_buffer() {
        let mut engine = CalibrationEngine::default();
        let t0 = Instant::now();
        engine.start(t0);
        engine.record(&state(50.0, 0.5, 0.0), t0);
        engine.start(t0);
        assert_eq!(engine.sample_count(), 0);
    }

    #[test]
    fn record_roundtrip() {
        let profile = CalibrationProfile {
            name: "Grace".into(),
            hrv_low: 25.0,
            hrv_high: 90.5,
            alpha_baseline: 0.3,
            gsr_baseline: 0.12,
        };
        let back = CalibrationProfile::from_record(&profile.to_record());
        assert_eq!(back, profile);
        let back = CalibrationProfile::from_json(&profile.to_json()).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn malformed_fields_fall_back_individually() {
        let json = r#"{"name": "Lin", "hrv_low": "abc", "hrv_high": 120, "alpha_baseline": null}"#;
        let p = CalibrationProfile::from_json(json).unwrap();
        let d = CalibrationProfile::default();
        assert_eq!(p.name, "Lin");
        assert_eq!(p.hrv_low, d.hrv_low);
        assert_eq!(p.hrv_high, 120.0);
        assert_eq!(p.alpha_baseline, d.alpha_baseline);
        assert_eq!(p.gsr_baseline, d.gsr_baseline);
    }

    #[test]
    fn unreadable_json_is_an_error_or_defaults() {
        assert!(CalibrationProfile::from_json("not json").is_err());
        assert_eq!(
            CalibrationProfile::from_json_lenient("not json"),
            CalibrationProfile::default()
        );
        assert_eq!(
            CalibrationProfile::from_json_lenient("[1, 2]"),
            CalibrationProfile::default()
        );
    }
}
