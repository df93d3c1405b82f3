//! Engine configuration: mapper ranges, bridge routing and the starting
//! calibration profile, loadable from JSON.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::Aggregator;
use crate::bridge::{BridgeConfig, ProtocolBridge};
use crate::calibration::CalibrationProfile;
use crate::error::{BioResult, ConfigError};
use crate::mapper::MapperConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mapper: MapperConfig,
    pub bridge: BridgeConfig,
    pub profile: CalibrationProfile,
}

impl EngineConfig {
    pub fn validate(&self) -> BioResult<()> {
        self.mapper.validate()?;
        self.bridge.validate()?;
        Ok(())
    }

    /// Parse and validate. Missing sections fall back to their defaults.
    pub fn from_json(json: &str) -> BioResult<Self> {
        let config: EngineConfig = serde_json::from_str(json).map_err(ConfigError::Json)?;
        config.validate()?;
        debug!(channels = config.bridge.channels.len(), "engine config loaded");
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Build an aggregator and an idle bridge already reading from it.
    pub fn build(&self) -> (Aggregator, ProtocolBridge) {
        let aggregator = Aggregator::new(self.mapper.clone(), self.profile.clone());
        let mut bridge = ProtocolBridge::new(self.bridge.clone());
        bridge.attach_source(aggregator.shared_state());
        (aggregator, bridge)
    }
}
