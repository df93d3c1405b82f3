pub mod aggregator;
pub mod bridge;
pub mod calibration;
pub mod config;
pub mod error;
pub mod mapper;
pub mod sensors;
pub mod state;

pub use aggregator::Aggregator;
pub use bridge::{BioChannel, BridgeConfig, MessageSink, ProtocolBridge, ProtocolMessage};
pub use calibration::{CalibrationEngine, CalibrationOutcome, CalibrationProfile};
pub use config::EngineConfig;
pub use error::{BioError, BioResult};
pub use mapper::{AudioParameterSet, MapperConfig, ParameterMapper};
pub use sensors::SensorReading;
pub use state::{BiometricState, BreathPhase, SharedState};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the biosonic-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: map a biometric state object onto audio parameters using
/// the default ranges. A missing or `undefined` profile uses the default
/// calibration.
#[wasm_bindgen]
pub fn map_biometrics(state: JsValue, profile: JsValue) -> Result<JsValue, JsValue> {
    let state: BiometricState =
        serde_wasm_bindgen::from_value(state).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let profile: CalibrationProfile = if profile.is_undefined() || profile.is_null() {
        CalibrationProfile::default()
    } else {
        serde_wasm_bindgen::from_value(profile).map_err(|e| JsValue::from_str(&format!("{e}")))?
    };
    let params = ParameterMapper::default().map(&state, &profile);
    serde_wasm_bindgen::to_value(&params).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: encode one controller message as its two 32-bit words.
/// `value` is clamped to [0, 1].
#[wasm_bindgen]
pub fn encode_controller(group: u8, channel: u8, controller: u8, value: f64) -> Vec<u32> {
    ProtocolMessage::control_change_normalized(group, channel, controller, value)
        .words()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_controller_matches_packet_layout() {
        let words = encode_controller(0, 0, 74, 1.0);
        assert_eq!(words, vec![0x40B0_4A00, 0xFFFF_FFFF]);
    }

    #[test]
    fn encode_controller_clamps_value() {
        assert_eq!(encode_controller(0, 0, 7, -3.0)[1], 0);
        assert_eq!(encode_controller(0, 0, 7, 9.0)[1], u32::MAX);
    }
}
