//! Parameter mapper: biometric state to bounded audio-synthesis parameters.
//!
//! The mapping is a pure function of the state and the calibration profile.
//! Every parameter first becomes a normalized position in [0, 1] and is then
//! scaled into its configured output range, so no input (including
//! nonsensical calibration data) can push a parameter out of bounds.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationProfile;
use crate::error::{BioResult, ConfigError};
use crate::sensors::clamp01;
use crate::state::BiometricState;

/// Source ranges narrower than this are treated as degenerate.
const RANGE_EPSILON: f64 = 1e-9;

/// Position of `value` within `[lo, hi]`, clamped to [0, 1].
///
/// A degenerate range maps everything to 0.
pub fn normalize(value: f64, lo: f64, hi: f64) -> f64 {
    if !(hi - lo).is_finite() || hi - lo < RANGE_EPSILON {
        return 0.0;
    }
    clamp01((value.clamp(lo, hi) - lo) / (hi - lo))
}

/// Linear interpolation between `lo` and `hi` for `t` in [0, 1].
pub fn lerp(lo: f64, hi: f64, t: f64) -> f64 {
    let v = lo + (hi - lo) * clamp01(t);
    // rounding can land one ulp outside the endpoints
    v.clamp(lo.min(hi), lo.max(hi))
}

/// Normalize within the source range, then scale into the output range.
pub fn map_range(value: f64, src_lo: f64, src_hi: f64, dst_lo: f64, dst_hi: f64) -> f64 {
    lerp(dst_lo, dst_hi, normalize(value, src_lo, src_hi))
}

// ── Parameters ──────────────────────────────────────────────

/// Parameters handed to the synthesis engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParameterSet {
    pub filter_resonance: f64,
    pub reverb_size: f64,
    pub lfo_rate_hz: f64,
    pub distortion: f64,
    pub filter_cutoff_hz: f64,
    pub master_volume: f64,
    /// Seconds.
    pub delay_time: f64,
    pub modulation_depth: f64,
}

impl Default for AudioParameterSet {
    /// Resting values, also used for disabled channels.
    fn default() -> Self {
        AudioParameterSet {
            filter_resonance: 0.5,
            reverb_size: 0.5,
            lfo_rate_hz: 0.2,
            distortion: 0.0,
            filter_cutoff_hz: 2700.0,
            master_volume: 0.7,
            delay_time: 0.55,
            modulation_depth: 0.25,
        }
    }
}

/// Output range and enable flag for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub enabled: bool,
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub const fn new(min: f64, max: f64) -> Self {
        ParameterRange { enabled: true, min, max }
    }

    fn scale(&self, t: f64) -> f64 {
        lerp(self.min, self.max, t)
    }
}

/// Per-parameter ranges. Defaults reproduce the reference mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapperConfig {
    pub filter_resonance: ParameterRange,
    pub reverb_size: ParameterRange,
    pub lfo_rate_hz: ParameterRange,
    pub distortion: ParameterRange,
    pub filter_cutoff_hz: ParameterRange,
    pub master_volume: ParameterRange,
    pub delay_time: ParameterRange,
    pub modulation_depth: ParameterRange,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            filter_resonance: ParameterRange::new(0.1, 0.95),
            reverb_size: ParameterRange::new(0.0, 1.0),
            // breathing rate / 60, up to one breath per second
            lfo_rate_hz: ParameterRange::new(0.0, 1.0),
            distortion: ParameterRange::new(0.0, 0.5),
            filter_cutoff_hz: ParameterRange::new(200.0, 5200.0),
            master_volume: ParameterRange::new(0.5, 1.0),
            delay_time: ParameterRange::new(0.1, 1.0),
            modulation_depth: ParameterRange::new(0.0, 0.5),
        }
    }
}

impl MapperConfig {
    fn ranges(&self) -> [(&'static str, &ParameterRange); 8] {
        [
            ("filterResonance", &self.filter_resonance),
            ("reverbSize", &self.reverb_size),
            ("lfoRateHz", &self.lfo_rate_hz),
            ("distortion", &self.distortion),
            ("filterCutoffHz", &self.filter_cutoff_hz),
            ("masterVolume", &self.master_volume),
            ("delayTime", &self.delay_time),
            ("modulationDepth", &self.modulation_depth),
        ]
    }

    pub fn validate(&self) -> BioResult<()> {
        for (name, r) in self.ranges() {
            if !(r.min < r.max) {
                return Err(ConfigError::InvertedRange {
                    channel: name.to_string(),
                    min: r.min,
                    max: r.max,
                }
                .into());
            }
        }
        Ok(())
    }
}

// ── Mapper ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ParameterMapper {
    config: MapperConfig,
}

impl ParameterMapper {
    pub fn new(config: MapperConfig) -> Self {
        ParameterMapper { config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: MapperConfig) {
        self.config = config;
    }

    pub fn map(&self, state: &BiometricState, profile: &CalibrationProfile) -> AudioParameterSet {
        let c = &self.config;
        let rest = AudioParameterSet::default();
        let pick = |range: &ParameterRange, t: f64, resting: f64| {
            if range.enabled { range.scale(t) } else { resting }
        };

        let resonance_t = normalize(state.hrv, profile.hrv_low, profile.hrv_high);
        let reverb_t = clamp01((state.alpha - profile.alpha_baseline) + 0.5);
        // Rate in Hz, positioned within the configured Hz range.
        let lfo_t = normalize(state.breathing_rate / 60.0, c.lfo_rate_hz.min, c.lfo_rate_hz.max);
        let distortion_t = clamp01((state.stress_index - profile.gsr_baseline) * 2.0);

        AudioParameterSet {
            filter_resonance: pick(&c.filter_resonance, resonance_t, rest.filter_resonance),
            reverb_size: pick(&c.reverb_size, reverb_t, rest.reverb_size),
            lfo_rate_hz: pick(&c.lfo_rate_hz, lfo_t, rest.lfo_rate_hz),
            distortion: pick(&c.distortion, distortion_t, rest.distortion),
            filter_cutoff_hz: pick(&c.filter_cutoff_hz, state.focus, rest.filter_cutoff_hz),
            master_volume: pick(&c.master_volume, state.coherence, rest.master_volume),
            delay_time: pick(&c.delay_time, state.relaxation, rest.delay_time),
            modulation_depth: pick(&c.modulation_depth, state.breathing_depth, rest.modulation_depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn map(state: &BiometricState) -> AudioParameterSet {
        ParameterMapper::default().map(state, &CalibrationProfile::default())
    }

    #[test]
    fn hrv_below_calibrated_low_floors_resonance() {
        let state = BiometricState { hrv: 5.0, ..Default::default() };
        let p = map(&state);
        assert!(approx(p.filter_resonance, 0.1));
    }

    #[test]
    fn hrv_above_high_caps_resonance() {
        let state = BiometricState { hrv: 500.0, ..Default::default() };
        assert!(approx(map(&state).filter_resonance, 0.95));
    }

    #[test]
    fn reference_formulas() {
        let state = BiometricState {
            hrv: 60.0,
            alpha: 0.7,
            breathing_rate: 6.0,
            stress_index: 0.1,
            focus: 0.5,
            coherence: 0.8,
            relaxation: 0.4,
            breathing_depth: 0.6,
            ..Default::default()
        };
        let p = map(&state);
        assert!(approx(p.filter_resonance, 0.1 + 0.5 * 0.85));
        assert!(approx(p.reverb_size, 0.7));
        assert!(approx(p.lfo_rate_hz, 0.1));
        assert!(approx(p.distortion, 0.1));
        assert!(approx(p.filter_cutoff_hz, 2700.0));
        assert!(approx(p.master_volume, 0.9));
        assert!(approx(p.delay_time, 0.1 + 0.4 * 0.9));
        assert!(approx(p.modulation_depth, 0.3));
    }

    #[test]
    fn distortion_saturates_at_half() {
        let state = BiometricState { stress_index: 9.0, ..Default::default() };
        assert!(approx(map(&state).distortion, 0.5));
    }

    #[test]
    fn inverted_profile_cannot_escape_bounds() {
        let profile = CalibrationProfile {
            hrv_low: 80.0,
            hrv_high: 10.0,
            alpha_baseline: f64::NAN,
            gsr_baseline: -1e9,
            ..Default::default()
        };
        let state = BiometricState { hrv: 50.0, stress_index: 1.0, ..Default::default() };
        let p = ParameterMapper::default().map(&state, &profile);
        assert!(approx(p.filter_resonance, 0.1));
        assert!((0.0..=1.0).contains(&p.reverb_size));
        assert!(approx(p.distortion, 0.5));
    }

    #[test]
    fn disabled_channel_rests() {
        let mut config = MapperConfig::default();
        config.filter_cutoff_hz.enabled = false;
        let mapper = ParameterMapper::new(config);
        let state = BiometricState { focus: 1.0, ..Default::default() };
        let p = mapper.map(&state, &CalibrationProfile::default());
        assert_eq!(p.filter_cutoff_hz, AudioParameterSet::default().filter_cutoff_hz);
    }

    #[test]
    fn custom_range_rescales_output() {
        let mut config = MapperConfig::default();
        config.master_volume = ParameterRange::new(0.0, 0.5);
        let state = BiometricState { coherence: 0.8, ..Default::default() };
        let p = ParameterMapper::new(config).map(&state, &CalibrationProfile::default());
        assert!(approx(p.master_volume, 0.4));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut config = MapperConfig::default();
        assert!(config.validate().is_ok());
        config.delay_time = ParameterRange::new(1.0, 0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn normalize_degenerate_range() {
        assert_eq!(normalize(5.0, 3.0, 3.0), 0.0);
        assert_eq!(normalize(5.0, 4.0, 2.0), 0.0);
        assert_eq!(map_range(0.5, 0.0, 1.0, 10.0, 20.0), 15.0);
    }
}
