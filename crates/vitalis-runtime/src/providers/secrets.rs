//! API keys for remote backends.
//!
//! A key moves into a [`SecretString`] as soon as it is read. The plain
//! text is reachable only through [`ApiCredential::expose`], where the
//! `Authorization` header is built.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Provider-options key holding an inline API key.
pub const API_KEY_OPTION: &str = "api_key";

/// Where a key came from. Shown in logs instead of the key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `api_key` in the provider options
    Options,
    Environment,
    /// Passed in code
    Inline,
}

impl CredentialSource {
    fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Options => "provider options",
            CredentialSource::Environment => "environment",
            CredentialSource::Inline => "inline",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An API key that cannot leak through `Debug` or `Display`.
pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    label: &'static str,
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn option_key(options: &JsonValue) -> Option<&str> {
    options.get(API_KEY_OPTION)?.as_str().and_then(non_blank)
}

fn env_key(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .and_then(|raw| non_blank(&raw).map(str::to_string))
}

impl ApiCredential {
    /// Wrap a key supplied in code. Blank keys are accepted here and
    /// reported by [`ApiCredential::is_blank`].
    pub fn inline(key: impl Into<String>, label: &'static str) -> Self {
        Self::wrap(key.into(), CredentialSource::Inline, label)
    }

    fn wrap(key: String, source: CredentialSource, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(key),
            source,
            label,
        }
    }

    /// Read the key from `env_var`; blank values count as missing.
    pub fn from_env(env_var: &str, label: &'static str) -> Result<Self, ProviderError> {
        env_key(env_var)
            .map(|key| Self::wrap(key, CredentialSource::Environment, label))
            .ok_or_else(|| ProviderError::NotConfigured(format!("{} missing: {} is not set", label, env_var)))
    }

    /// `api_key` from the provider options, else `env_var`.
    pub fn resolve(options: &JsonValue, env_var: &str, label: &'static str) -> Result<Self, ProviderError> {
        if let Some(key) = option_key(options) {
            return Ok(Self::wrap(key.to_string(), CredentialSource::Options, label));
        }
        Self::from_env(env_var, label).map_err(|_| {
            ProviderError::NotConfigured(format!(
                "{} missing: set '{}' in the provider options or export {}",
                label, API_KEY_OPTION, env_var
            ))
        })
    }

    /// Whether [`ApiCredential::resolve`] would succeed.
    pub fn is_available(options: &JsonValue, env_var: &str) -> bool {
        option_key(options).is_some() || env_key(env_var).is_some()
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential({}, {}, [REDACTED])", self.label, self.source)
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_never_formatted() {
        let key = ApiCredential::inline("gsk-secret-123", "Groq API key");

        let debug = format!("{:?}", key);
        assert_eq!(debug, "ApiCredential(Groq API key, inline, [REDACTED])");
        assert_eq!(key.to_string(), "Groq API key (inline)");
        assert_eq!(key.expose(), "gsk-secret-123");
        assert!(!key.is_blank());
        assert!(ApiCredential::inline("  ", "Groq API key").is_blank());
    }

    #[test]
    fn test_options_win_over_environment() {
        let options = serde_json::json!({"api_key": " from-options "});
        let key = ApiCredential::resolve(&options, "VITALIS_TEST_UNSET_KEY_A", "Test key").unwrap();

        assert_eq!(key.expose(), "from-options");
        assert_eq!(key.source(), CredentialSource::Options);
    }

    #[test]
    fn test_blank_option_counts_as_missing() {
        let options = serde_json::json!({"api_key": "   "});

        match ApiCredential::resolve(&options, "VITALIS_TEST_UNSET_KEY_B", "Test key") {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("VITALIS_TEST_UNSET_KEY_B"));
                assert!(msg.contains("api_key"));
            }
            other => panic!("expected NotConfigured, got {:?}", other),
        }
        assert!(!ApiCredential::is_available(&options, "VITALIS_TEST_UNSET_KEY_B"));
    }
}
