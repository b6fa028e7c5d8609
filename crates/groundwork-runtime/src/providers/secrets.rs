//! Provider credentials.
//!
//! A [`CredentialLookup`] says where a key may come from; [`ApiCredential`]
//! holds the resolved key in a `secrecy::SecretString`. The key is only
//! reachable through [`ApiCredential::expose`], where the request is built.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a provider looks for its key.
#[derive(Debug, Clone, Copy)]
pub struct CredentialLookup {
    /// Human label used in errors, e.g. "OpenAI API key"
    pub label: &'static str,
    /// Key inside the provider's JSON config
    pub config_key: &'static str,
    pub env_var: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "programmatic",
        }
    }
}

pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn programmatic(lookup: &CredentialLookup, value: impl Into<String>) -> Self {
        Self::wrap(lookup, value.into(), CredentialSource::Programmatic)
    }

    pub fn from_env(lookup: &CredentialLookup) -> Result<Self, ProviderError> {
        env_value(lookup.env_var)
            .map(|v| Self::wrap(lookup, v, CredentialSource::Environment))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} not set: export {}",
                    lookup.label, lookup.env_var
                ))
            })
    }

    /// Config first, then the environment. Blank values count as missing.
    pub fn resolve(lookup: &CredentialLookup, config: &JsonValue) -> Result<Self, ProviderError> {
        if let Some(value) = config_value(lookup, config) {
            return Ok(Self::wrap(lookup, value.to_string(), CredentialSource::Config));
        }
        if let Some(value) = env_value(lookup.env_var) {
            return Ok(Self::wrap(lookup, value, CredentialSource::Environment));
        }
        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in provider config or {}",
            lookup.label, lookup.config_key, lookup.env_var
        )))
    }

    /// Whether [`resolve`](Self::resolve) would succeed.
    pub fn is_available(lookup: &CredentialLookup, config: &JsonValue) -> bool {
        config_value(lookup, config).is_some() || env_value(lookup.env_var).is_some()
    }

    fn wrap(lookup: &CredentialLookup, value: String, source: CredentialSource) -> Self {
        Self {
            value: SecretString::from(value.trim().to_string()),
            source,
            label: lookup.label,
        }
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

fn config_value<'a>(lookup: &CredentialLookup, config: &'a JsonValue) -> Option<&'a str> {
    config
        .get(lookup.config_key)
        .and_then(JsonValue::as_str)
        .filter(|v| !v.trim().is_empty())
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential({}, {}, [REDACTED])", self.label, self.source.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "sk-groundwork-test-0123456789";

    fn lookup(env_var: &'static str) -> CredentialLookup {
        CredentialLookup {
            label: "Test key",
            config_key: "api_key",
            env_var,
        }
    }

    #[test]
    fn test_debug_redacts() {
        let cred = ApiCredential::programmatic(&lookup("UNUSED"), SECRET);
        let debug = format!("{:?}", cred);

        assert!(!debug.contains(SECRET));
        assert!(debug.contains("programmatic"));
        assert_eq!(cred.expose(), SECRET);
    }

    #[test]
    fn test_config_wins_over_env() {
        std::env::set_var("GROUNDWORK_TEST_KEY_PRIORITY", "env-key");
        let lookup = lookup("GROUNDWORK_TEST_KEY_PRIORITY");
        let cred = ApiCredential::resolve(&lookup, &json!({"api_key": "config-key"})).unwrap();
        std::env::remove_var("GROUNDWORK_TEST_KEY_PRIORITY");

        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_blank_config_falls_back_to_env() {
        std::env::set_var("GROUNDWORK_TEST_KEY_FALLBACK", "env-key\n");
        let lookup = lookup("GROUNDWORK_TEST_KEY_FALLBACK");
        let cred = ApiCredential::resolve(&lookup, &json!({"api_key": "  "})).unwrap();
        std::env::remove_var("GROUNDWORK_TEST_KEY_FALLBACK");

        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
    }

    #[test]
    fn test_missing_names_both_places() {
        let lookup = lookup("GROUNDWORK_UNSET_VAR_98765");
        let message = ApiCredential::resolve(&lookup, &json!({})).unwrap_err().to_string();

        assert!(message.contains("api_key"));
        assert!(message.contains("GROUNDWORK_UNSET_VAR_98765"));
        assert!(!ApiCredential::is_available(&lookup, &json!({})));
    }
}
