//! Error types.
//!
//! Nothing on the sensor or encoder path can fail: out-of-range input is
//! clamped and missing collaborators are skipped. Errors only surface from
//! configuration loading and the strict calibration-profile parser.

use thiserror::Error;

/// Result alias used by the fallible (non hot-path) operations.
pub type BioResult<T> = Result<T, BioError>;

#[derive(Debug, Error)]
pub enum BioError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("smoothing factor {name} = {value} is outside [0, 0.99]")]
    SmoothingFactor { name: &'static str, value: f64 },
    #[error("protocol channel {name} = {value} is outside 0..=15")]
    Channel { name: &'static str, value: u8 },
    #[error("protocol group {value} is outside 0..=15")]
    Group { value: u8 },
    #[error("range for {channel} is inverted or empty ({min} >= {max})")]
    InvertedRange {
        channel: String,
        min: f64,
        max: f64,
    },
    #[error("controller {controller} is assigned to more than one channel")]
    DuplicateController { controller: u8 },
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("calibration record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
