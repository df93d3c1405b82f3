//! Biometric state aggregator: the single merge point for all analyzers.
//!
//! Every sensor update runs its analyzer, merges the result into a private
//! working copy of the state, publishes that copy in one step, recomputes
//! the audio parameters and offers the snapshot to the calibration engine,
//! all before returning. There is no queue and no background thread.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, trace};

use crate::calibration::{CalibrationEngine, CalibrationOutcome, CalibrationProfile};
use crate::mapper::{AudioParameterSet, MapperConfig, ParameterMapper};
use crate::sensors::{
    CardiacAnalyzer, DermalAnalyzer, NeuralAnalyzer, NeuralBands, RespirationAnalyzer, SensorReading,
};
use crate::state::{BiometricState, SharedState};

#[derive(Debug)]
pub struct Aggregator {
    cardiac: CardiacAnalyzer,
    neural: NeuralAnalyzer,
    dermal: DermalAnalyzer,
    respiration: RespirationAnalyzer,

    working: BiometricState,
    shared: SharedState,

    mapper: ParameterMapper,
    parameters: AudioParameterSet,
    calibration: CalibrationEngine,

    created_at: Instant,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(MapperConfig::default(), CalibrationProfile::default())
    }
}

impl Aggregator {
    pub fn new(mapper_config: MapperConfig, profile: CalibrationProfile) -> Self {
        let working = BiometricState::default();
        let mapper = ParameterMapper::new(mapper_config);
        let parameters = mapper.map(&working, &profile);
        Aggregator {
            cardiac: CardiacAnalyzer::new(),
            neural: NeuralAnalyzer::new(),
            dermal: DermalAnalyzer::new(),
            respiration: RespirationAnalyzer::new(),
            working,
            shared: SharedState::new(working),
            mapper,
            parameters,
            calibration: CalibrationEngine::new(profile),
            created_at: Instant::now(),
        }
    }

    /// Replace the calibration engine, e.g. to shorten the session window.
    pub fn with_calibration(mut self, calibration: CalibrationEngine) -> Self {
        self.calibration = calibration;
        self.remap();
        self
    }

    // ── Sensor inputs ──

    pub fn update_heart_rate(&mut self, bpm: f64) -> bool {
        self.ingest(SensorReading::HeartRate(bpm))
    }

    pub fn update_heart_rate_at(&mut self, bpm: f64, now: Instant) -> bool {
        self.ingest_at(SensorReading::HeartRate(bpm), now)
    }

    pub fn update_eeg(&mut self, delta: f64, theta: f64, alpha: f64, beta: f64, gamma: f64) -> bool {
        self.ingest(SensorReading::Eeg(NeuralBands::new(delta, theta, alpha, beta, gamma)))
    }

    pub fn update_eeg_at(&mut self, bands: NeuralBands, now: Instant) -> bool {
        self.ingest_at(SensorReading::Eeg(bands), now)
    }

    pub fn update_gsr(&mut self, conductance: f64) -> bool {
        self.ingest(SensorReading::SkinConductance(conductance))
    }

    pub fn update_gsr_at(&mut self, conductance: f64, now: Instant) -> bool {
        self.ingest_at(SensorReading::SkinConductance(conductance), now)
    }

    pub fn update_breathing(&mut self, amplitude: f64) -> bool {
        self.ingest(SensorReading::Breathing(amplitude))
    }

    pub fn update_breathing_at(&mut self, amplitude: f64, now: Instant) -> bool {
        self.ingest_at(SensorReading::Breathing(amplitude), now)
    }

    pub fn ingest(&mut self, reading: SensorReading) -> bool {
        self.ingest_at(reading, Instant::now())
    }

    /// Run one reading through its analyzer and publish the merged state.
    ///
    /// Returns `false` if the analyzer rejected the reading; nothing is
    /// published in that case.
    pub fn ingest_at(&mut self, reading: SensorReading, now: Instant) -> bool {
        let mut next = self.working;

        let accepted = match reading {
            SensorReading::HeartRate(bpm) => self.cardiac.update(bpm).map(|m| m.apply(&mut next)),
            SensorReading::Eeg(bands) => Some(self.neural.update(bands).apply(&mut next)),
            SensorReading::SkinConductance(c) => self.dermal.update(c).map(|m| m.apply(&mut next)),
            SensorReading::Breathing(a) => self.respiration.update(a, now).map(|m| m.apply(&mut next)),
        }
        .is_some();

        if !accepted {
            return false;
        }

        next.sequence = self.working.sequence + 1;
        next.timestamp_secs = now.saturating_duration_since(self.created_at).as_secs_f64();

        self.working = next;
        self.shared.publish(next);
        self.parameters = self.mapper.map(&next, self.calibration.profile());
        trace!(sensor = reading.name(), sequence = next.sequence, "state published");

        if let Some(CalibrationOutcome::Committed(_)) = self.calibration.record(&next, now) {
            self.remap();
        }
        true
    }

    // ── Outputs ──

    /// Latest published state.
    pub fn state(&self) -> BiometricState {
        self.working
    }

    /// Reader handle for other threads (e.g. the protocol bridge).
    pub fn shared_state(&self) -> SharedState {
        self.shared.clone()
    }

    /// Parameters computed from the latest state.
    pub fn parameters(&self) -> &AudioParameterSet {
        &self.parameters
    }

    pub fn profile(&self) -> &Arc<CalibrationProfile> {
        self.calibration.profile()
    }

    pub fn set_profile(&mut self, profile: CalibrationProfile) {
        info!(name = %profile.name, "calibration profile loaded");
        self.calibration.set_profile(profile);
        self.remap();
    }

    pub fn mapper_config(&self) -> &MapperConfig {
        self.mapper.config()
    }

    pub fn set_mapper_config(&mut self, config: MapperConfig) {
        self.mapper.set_config(config);
        self.remap();
    }

    // ── Calibration ──

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn start_calibration(&mut self) {
        self.start_calibration_at(Instant::now());
    }

    pub fn start_calibration_at(&mut self, now: Instant) {
        self.calibration.start(now);
    }

    /// End a running session early and commit whatever was recorded.
    pub fn finish_calibration(&mut self) -> Option<CalibrationOutcome> {
        let outcome = self.calibration.finish();
        if let Some(CalibrationOutcome::Committed(_)) = outcome {
            self.remap();
        }
        outcome
    }

    /// One-line human-readable summary of the current state.
    pub fn status_summary(&self) -> String {
        let s = &self.working;
        let mut out = String::with_capacity(192);
        let _ = write!(
            out,
            "HR {:.0} bpm | HRV {:.1} ms | focus {:.2} | relax {:.2} | stress {:.2} | breath {:.1}/min ({}) | coherence {:.2}",
            s.heart_rate,
            s.hrv,
            s.focus,
            s.relaxation,
            s.stress_index,
            s.breathing_rate,
            if s.inhaling { "inhale" } else { "exhale" },
            s.coherence,
        );
        let profile = self.calibration.profile();
        if self.calibration.is_recording() {
            let pct = self.calibration.progress(Instant::now()) * 100.0;
            let _ = write!(out, " | calibrating {pct:.0}% ({} samples)", self.calibration.sample_count());
        } else {
            let _ = write!(out, " | profile '{}'", profile.name);
        }
        out
    }

    /// Clear every analyzer's history and publish a default state.
    /// The calibration profile is kept.
    pub fn reset(&mut self) {
        self.cardiac.reset();
        self.neural.reset();
        self.dermal.reset();
        self.respiration.reset();
        let sequence = self.working.sequence + 1;
        self.working = BiometricState { sequence, ..BiometricState::default() };
        self.shared.publish(self.working);
        self.remap();
    }

    fn remap(&mut self) {
        self.parameters = self.mapper.map(&self.working, self.calibration.profile());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::calibration::CALIBRATION_WINDOW;

    #[test]
    fn heart_rate_updates_publish_variability() {
        let mut agg = Aggregator::default();
        for bpm in [60.0, 60.0, 61.0, 60.0] {
            assert!(agg.update_heart_rate(bpm));
        }
        let s = agg.state();
        assert_eq!(s.heart_rate, 60.0);
        assert!(s.rmssd > 0.0);
        assert_eq!(s.hrv, s.rmssd);
        assert_eq!(s.sequence, 4);
        assert_eq!(agg.shared_state().snapshot(), s);
    }

    #[test]
    fn rejected_sample_changes_nothing() {
        let mut agg = Aggregator::default();
        agg.update_heart_rate(72.0);
        let before = agg.state();
        assert!(!agg.update_heart_rate(0.0));
        assert!(!agg.update_heart_rate(f64::NAN));
        assert_eq!(agg.state(), before);
    }

    #[test]
    fn eeg_update_recomputes_parameters() {
        let mut agg = Aggregator::default();
        agg.update_eeg(0.1, 0.2, 0.3, 1.0, 0.1);
        let s = agg.state();
        let p = agg.parameters();
        assert!((p.filter_cutoff_hz - (200.0 + s.focus * 5000.0)).abs() < 1e-9);
        assert!((p.delay_time - (0.1 + s.relaxation * 0.9)).abs() < 1e-9);
    }

    #[test]
    fn analyzers_merge_without_clobbering_each_other() {
        let mut agg = Aggregator::default();
        agg.update_eeg(0.0, 0.0, 1.0, 0.0, 0.0);
        for _ in 0..12 {
            agg.update_gsr(2.0);
        }
        agg.update_heart_rate(90.0);
        let s = agg.state();
        assert_eq!(s.alpha, 1.0);
        assert_eq!(s.skin_conductance, 2.0);
        assert_eq!(s.heart_rate, 90.0);
    }

    #[test]
    fn calibration_commits_on_update_path() {
        let mut agg = Aggregator::default();
        let t0 = Instant::now();
        agg.start_calibration_at(t0);

        agg.ingest_at(SensorReading::Eeg(NeuralBands::new(0.0, 0.0, 0.8, 0.0, 0.0)), t0);
        agg.ingest_at(SensorReading::Eeg(NeuralBands::new(0.0, 0.0, 0.6, 0.0, 0.0)), t0 + Duration::from_secs(20));
        assert!(agg.calibration().is_recording());

        agg.ingest_at(SensorReading::Eeg(NeuralBands::new(0.0, 0.0, 0.1, 0.0, 0.0)), t0 + CALIBRATION_WINDOW);
        assert!(!agg.calibration().is_recording());
        assert!((agg.profile().alpha_baseline - 0.7).abs() < 1e-12);

        // reverb is now relative to the new baseline: (0.1 - 0.7) + 0.5 < 0
        assert_eq!(agg.parameters().reverb_size, 0.0);
    }

    #[test]
    fn forced_finish_without_updates_is_a_no_op() {
        let mut agg = Aggregator::default();
        let before = (**agg.profile()).clone();
        agg.start_calibration();
        assert_eq!(agg.finish_calibration(), Some(CalibrationOutcome::Skipped));
        assert_eq!(**agg.profile(), before);
    }

    #[test]
    fn breathing_rate_flows_into_lfo() {
        let mut agg = Aggregator::default();
        let t0 = Instant::now();
        let period = Duration::from_secs(10);
        for i in 0..2u32 {
            let t = t0 + period * i;
            agg.update_breathing_at(0.1, t);
            agg.update_breathing_at(0.9, t);
            agg.update_breathing_at(0.1, t + period / 2);
        }
        let s = agg.state();
        assert!((s.breathing_rate - 6.0).abs() < 1e-9);
        assert_eq!(s.coherence, 0.8);
        assert!((agg.parameters().lfo_rate_hz - 0.1).abs() < 1e-9);
        assert!((agg.parameters().master_volume - 0.9).abs() < 1e-9);
    }

    #[test]
    fn status_summary_mentions_profile_and_calibration() {
        let mut agg = Aggregator::default();
        agg.update_heart_rate(72.0);
        let text = agg.status_summary();
        assert!(text.starts_with("HR 72 bpm"));
        assert!(text.contains("profile 'Default'"));

        agg.start_calibration();
        assert!(agg.status_summary().contains("calibrating"));
    }

    #[test]
    fn reset_keeps_profile_and_bumps_sequence() {
        let mut agg = Aggregator::default();
        agg.set_profile(CalibrationProfile { name: "Kim".into(), ..Default::default() });
        agg.update_heart_rate(80.0);
        agg.reset();
        let s = agg.state();
        assert_eq!(s.heart_rate, BiometricState::default().heart_rate);
        assert_eq!(s.sequence, 2);
        assert_eq!(agg.profile().name, "Kim");
    }
}
