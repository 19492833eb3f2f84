//! Configuration loading.
//!
//! Configs are plain serde structs, read from JSON. Missing fields fall back
//! to the defaults of the face-ViT recipes (mask ratio `0.1`, native noise).

use crate::masking::{NoisePrecision, validate_mask_ratio};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings of the masking stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Fraction of patches dropped during training, in `[0, 1)`.
    pub mask_ratio: f64,
    pub precision: NoisePrecision,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            mask_ratio: 0.1,
            precision: NoisePrecision::Native,
        }
    }
}

impl MaskingConfig {
    pub fn validate(&self) -> Result<()> {
        validate_mask_ratio(self.mask_ratio).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Parses and validates a config from a JSON string.
pub fn from_json_str<C: DeserializeOwned + Validate>(json: &str) -> Result<C> {
    let config: C = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates a JSON config file.
pub fn from_file<C: DeserializeOwned + Validate>(path: impl AsRef<Path>) -> Result<C> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), "loading config");
    from_json_str(&json)
}

/// Configs that can check their own invariants after deserialisation.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for MaskingConfig {
    fn validate(&self) -> Result<()> {
        MaskingConfig::validate(self)
    }
}
