//! Fact grounding configuration.
//!
//! All options have defaults, so an empty YAML document is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Options governing extraction, validation and verification of facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FactConfig {
    /// Minimum similarity for a span to ground a claim (inclusive)
    pub grounding_threshold: f64,

    /// Minimum fact_text length in chars
    pub min_fact_length: usize,

    /// Maximum fact_text length in chars
    pub max_fact_length: usize,

    /// Run the chain-of-verification stage
    pub enable_verification: bool,

    /// Confidence consumers should treat as "verified enough"
    pub verification_confidence_threshold: f64,

    /// Plan/Execute rounds before giving up on an unanswered question
    pub max_verification_rounds: u32,

    /// Certainty assumed when the generator reports none
    pub confidence_prior: f64,

    /// Largest run of consecutive sentences considered as one span
    pub max_window_sentences: usize,

    /// Sentences on each side of a span inspected by the consistency check
    pub consistency_window_sentences: usize,

    /// Version tag of the current extraction method generation
    pub extraction_version: u32,
}

impl Default for FactConfig {
    fn default() -> Self {
        Self {
            grounding_threshold: 0.80,
            min_fact_length: 10,
            max_fact_length: 500,
            enable_verification: false,
            verification_confidence_threshold: 0.70,
            max_verification_rounds: 2,
            confidence_prior: 0.85,
            max_window_sentences: 3,
            consistency_window_sentences: 1,
            extraction_version: 1,
        }
    }
}

impl FactConfig {
    /// Parse a config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: FactConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FactConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Whether a text length (in chars) is inside the configured bounds.
    pub fn length_in_bounds(&self, text: &str) -> bool {
        let len = text.chars().count();
        len >= self.min_fact_length && len <= self.max_fact_length
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("grounding_threshold", self.grounding_threshold)?;
        check_unit(
            "verification_confidence_threshold",
            self.verification_confidence_threshold,
        )?;
        check_unit("confidence_prior", self.confidence_prior)?;

        if self.min_fact_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_fact_length",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.min_fact_length > self.max_fact_length {
            return Err(ConfigError::InvalidValue {
                field: "max_fact_length",
                reason: format!(
                    "{} is smaller than min_fact_length {}",
                    self.max_fact_length, self.min_fact_length
                ),
            });
        }

        if self.max_verification_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_verification_rounds",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.max_window_sentences == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_window_sentences",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{} is outside [0, 1]", value),
        });
    }
    Ok(())
}
