//! Property tests for the analyzer, mapper and encoder invariants.

use std::time::{Duration, Instant};

use biosonic_core::bridge::ump::{dequantize_u32, quantize_u32};
use biosonic_core::calibration::{CalibrationEngine, CalibrationOutcome, CalibrationProfile};
use biosonic_core::mapper::{MapperConfig, ParameterMapper};
use biosonic_core::sensors::dermal::MIN_SAMPLES;
use biosonic_core::sensors::neural::analyze;
use biosonic_core::sensors::respiration::{COHERENT_SCORE, INCOHERENT_SCORE};
use biosonic_core::sensors::{CardiacAnalyzer, DermalAnalyzer, NeuralBands, RespirationAnalyzer};
use biosonic_core::{BiometricState, ProtocolMessage};
use proptest::prelude::*;

fn in_unit(x: f64) -> bool {
    (0.0..=1.0).contains(&x)
}

proptest! {
    #[test]
    fn prop_variability_is_non_negative(bpms in prop::collection::vec(20.0f64..240.0, 1..150)) {
        let mut cardiac = CardiacAnalyzer::new();
        for bpm in bpms {
            let m = cardiac.update(bpm).unwrap();
            if let Some(v) = m.variability {
                prop_assert!(v.rmssd >= 0.0);
                prop_assert!(v.sdnn >= 0.0);
                prop_assert!((0.0..=100.0).contains(&v.pnn50));
            }
        }
        prop_assert!(cardiac.interval_count() <= 60);
    }

    #[test]
    fn prop_neural_indices_stay_in_unit_range(
        delta in -10.0f64..10.0,
        theta in -10.0f64..10.0,
        alpha in -10.0f64..10.0,
        beta in -10.0f64..10.0,
        gamma in -10.0f64..10.0,
    ) {
        let m = analyze(NeuralBands::new(delta, theta, alpha, beta, gamma));
        prop_assert!(in_unit(m.focus));
        prop_assert!(in_unit(m.relaxation));
        prop_assert!(in_unit(m.meditation));
        prop_assert!(in_unit(m.attention));
    }

    #[test]
    fn prop_stress_is_zero_until_window_fills(samples in prop::collection::vec(0.0f64..50.0, 1..40)) {
        let mut dermal = DermalAnalyzer::new();
        for (i, s) in samples.into_iter().enumerate() {
            let m = dermal.update(s).unwrap();
            if i + 1 < MIN_SAMPLES {
                prop_assert_eq!(m.stress_index, 0.0);
            } else {
                prop_assert!(m.stress_index >= 0.0);
            }
            prop_assert_eq!(m.arousal, s);
        }
    }

    #[test]
    fn prop_constant_conductance_has_zero_stress(v in -1e6f64..1e6, n in 10usize..150) {
        let mut dermal = DermalAnalyzer::new();
        for _ in 0..n {
            let m = dermal.update(v).unwrap();
            prop_assert_eq!(m.stress_index, 0.0);
        }
    }

    #[test]
    fn prop_coherence_is_one_of_two_scores(
        trace in prop::collection::vec((0.0f64..1.0, 1u64..5_000), 1..200),
    ) {
        let mut resp = RespirationAnalyzer::new();
        let mut now = Instant::now();
        for (amplitude, step_ms) in trace {
            now += Duration::from_millis(step_ms);
            let m = resp.update(amplitude, now).unwrap();
            if let Some(c) = m.coherence {
                prop_assert!(c == COHERENT_SCORE || c == INCOHERENT_SCORE);
            }
            if let Some(d) = m.depth {
                prop_assert!(in_unit(d));
            }
        }
    }

    #[test]
    fn prop_empty_session_keeps_profile(
        hrv_low in 0.0f64..200.0,
        hrv_high in 0.0f64..200.0,
        alpha in 0.0f64..1.0,
    ) {
        let profile = CalibrationProfile {
            name: "Prop".into(),
            hrv_low,
            hrv_high,
            alpha_baseline: alpha,
            gsr_baseline: 0.0,
        };
        let mut engine = CalibrationEngine::new(profile.clone());
        engine.start(Instant::now());
        prop_assert_eq!(engine.finish(), Some(CalibrationOutcome::Skipped));
        prop_assert_eq!(&**engine.profile(), &profile);
    }

    #[test]
    fn prop_mapped_parameters_respect_ranges(
        hrv in -50.0f64..500.0,
        alpha in -1.0f64..2.0,
        rate in 0.0f64..120.0,
        stress in -5.0f64..5.0,
        focus in 0.0f64..1.0,
        relaxation in 0.0f64..1.0,
        coherence in 0.0f64..1.0,
        depth in 0.0f64..1.0,
        hrv_low in -100.0f64..200.0,
        hrv_high in -100.0f64..200.0,
    ) {
        let state = BiometricState {
            hrv,
            alpha,
            breathing_rate: rate,
            stress_index: stress,
            focus,
            relaxation,
            coherence,
            breathing_depth: depth,
            ..Default::default()
        };
        let profile = CalibrationProfile { hrv_low, hrv_high, ..Default::default() };
        let config = MapperConfig::default();
        let p = ParameterMapper::new(config.clone()).map(&state, &profile);

        let within = |v: f64, r: &biosonic_core::mapper::ParameterRange| v >= r.min && v <= r.max;
        prop_assert!(within(p.filter_resonance, &config.filter_resonance));
        prop_assert!(within(p.reverb_size, &config.reverb_size));
        prop_assert!(within(p.lfo_rate_hz, &config.lfo_rate_hz));
        prop_assert!(within(p.distortion, &config.distortion));
        prop_assert!(within(p.filter_cutoff_hz, &config.filter_cutoff_hz));
        prop_assert!(within(p.master_volume, &config.master_volume));
        prop_assert!(within(p.delay_time, &config.delay_time));
        prop_assert!(within(p.modulation_depth, &config.modulation_depth));
    }

    #[test]
    fn prop_quantization_error_is_below_one_step(v in 0.0f64..=1.0) {
        let back = dequantize_u32(quantize_u32(v));
        prop_assert!((back - v).abs() <= 1.0 / u32::MAX as f64);
    }

    #[test]
    fn prop_controller_packets_decode_to_themselves(
        group in 0u8..16,
        channel in 0u8..16,
        controller in 0u8..128,
        value in any::<u32>(),
    ) {
        let msg = ProtocolMessage::control_change(group, channel, controller, value);
        prop_assert_eq!(ProtocolMessage::from_words(msg.words()), Some(msg));
    }
}
