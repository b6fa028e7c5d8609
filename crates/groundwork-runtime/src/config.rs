//! Runtime configuration.
//!
//! One YAML document configures the whole pipeline. Fact options live under
//! `facts`; everything else concerns calling the generator. Durations are
//! written in human form (`"30s"`, `"1m 30s"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use groundwork_core::{ConfigError, FactConfig};

use crate::capability::CallSite;
use crate::providers::CompletionConfig;
use crate::resilience::{BudgetConfig, CircuitBreakerConfig};

/// Serde helpers for durations written as humantime strings.
pub mod duration_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}

/// Deadline for each kind of generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "duration_str")]
    pub decompose: Duration,

    #[serde(with = "duration_str")]
    pub plan: Duration,

    #[serde(with = "duration_str")]
    pub execute: Duration,
}

impl TimeoutConfig {
    pub fn for_site(&self, site: CallSite) -> Duration {
        match site {
            CallSite::Decompose => self.decompose,
            CallSite::Plan => self.plan,
            CallSite::Execute => self.execute,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            decompose: Duration::from_secs(60),
            plan: Duration::from_secs(20),
            execute: Duration::from_secs(30),
        }
    }
}

/// Bounded exponential backoff at the call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: usize,

    #[serde(with = "duration_str")]
    pub min_delay: Duration,

    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Decomposition cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub facts: FactConfig,
    pub generation: CompletionConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub budgets: BudgetConfig,
    pub cache: CacheConfig,

    /// Scoped threads used for batch validation
    pub validation_workers: usize,

    /// Concurrent fact verifications
    pub verification_pool_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            facts: FactConfig::default(),
            generation: CompletionConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            budgets: BudgetConfig::default(),
            cache: CacheConfig::default(),
            validation_workers: 4,
            verification_pool_size: 4,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.facts.validate()?;

        if self.validation_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "validation_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.verification_pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "verification_pool_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_delay",
                reason: "is smaller than retry.min_delay".to_string(),
            });
        }
        for site in CallSite::ALL {
            if self.timeouts.for_site(site).is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: "timeouts",
                    reason: format!("{} timeout must be positive", site),
                });
            }
        }

        Ok(())
    }
}
