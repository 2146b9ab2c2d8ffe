//! Runtime configuration.
//!
//! Built once at startup (usually from YAML) and passed into the engine.
//! Durations are written as human-readable strings (`2s`, `500ms`, `1m 30s`).
//!
//! ```yaml
//! provider:
//!   type: groq
//!   base_url: https://api.groq.com/openai/v1
//! models:
//!   - llama-3.3-70b-versatile
//!   - llama-3.1-8b-instant
//!   - mixtral-8x7b-32768
//! retry:
//!   max_retries: 2
//!   base_delay: 2s
//!   max_delay: 30s
//! completion:
//!   temperature: 0.6
//!   max_tokens: 2048
//!   call_timeout: 30s
//! request_deadline: 90s
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::{CompletionConfig, ProviderError, ProviderRegistry};
use crate::resilience::{FallbackChain, RetryPolicy, DEFAULT_MODELS};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Which backend serves the model chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Registry key, e.g. "groq"
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: "groq".to_string(),
            base_url: None,
        }
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_tokens: u32,

    /// Bound on a single backend call
    #[serde(with = "duration_str")]
    pub call_timeout: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: 2048,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl CompletionSettings {
    /// Completion config for one model in the chain.
    pub fn for_model(&self, model: &str) -> CompletionConfig {
        CompletionConfig {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.call_timeout,
            json_response: true,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderSection,

    /// Model identifiers, tried in order
    pub models: Vec<String>,

    pub retry: RetryPolicy,

    pub completion: CompletionSettings,

    /// Optional bound on the whole fallback walk
    #[serde(with = "option_duration_str", skip_serializing_if = "Option::is_none")]
    pub request_deadline: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSection::default(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            retry: RetryPolicy::default(),
            completion: CompletionSettings::default(),
            request_deadline: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.kind.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.type must not be empty".to_string()));
        }
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("at least one model is required".to_string()));
        }
        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid("model identifiers must not be empty".to_string()));
        }
        if let Some(url) = &self.provider.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "provider.base_url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(ConfigError::Invalid(
                "completion.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.completion.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "completion.max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.completion.call_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "completion.call_timeout must be greater than zero".to_string(),
            ));
        }
        if self.request_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Invalid(
                "request_deadline must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Options handed to the provider factory.
    pub fn provider_options(&self) -> JsonValue {
        let mut options = serde_json::Map::new();
        if let Some(url) = &self.provider.base_url {
            options.insert("base_url".to_string(), JsonValue::String(url.clone()));
        }
        JsonValue::Object(options)
    }

    /// Validate the settings and the provider options against `registry`
    /// without creating the provider.
    pub fn validate_with(&self, registry: &ProviderRegistry) -> Result<(), ConfigError> {
        self.validate()?;
        registry.validate(&self.provider.kind, &self.provider_options())?;
        Ok(())
    }

    /// Create the provider and bind it to every configured model.
    pub fn build_chain(&self, registry: &ProviderRegistry) -> Result<FallbackChain, ConfigError> {
        self.validate_with(registry)?;
        let provider = registry.create(&self.provider.kind, &self.provider_options())?;
        Ok(FallbackChain::from_models(provider, self.models.iter().cloned()))
    }
}

/// Serde adapter for `Duration` as a humantime string.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
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
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod option_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.provider.kind, "groq");
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay, Duration::from_secs(2));
        assert_eq!(config.completion.call_timeout, Duration::from_secs(30));
        assert!(config.request_deadline.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_with_durations() {
        let config = RuntimeConfig::from_yaml(
            r#"
provider:
  type: groq
  base_url: https://proxy.example.org/v1
models: [llama-3.1-8b-instant]
retry:
  max_retries: 1
  base_delay: 500ms
completion:
  call_timeout: 10s
request_deadline: 1m 30s
"#,
        )
        .unwrap();

        assert_eq!(config.models, vec!["llama-3.1-8b-instant".to_string()]);
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.completion.call_timeout, Duration::from_secs(10));
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(config.request_deadline, Some(Duration::from_secs(90)));
        assert_eq!(
            config.provider_options()["base_url"],
            "https://proxy.example.org/v1"
        );
    }

    #[test]
    fn test_empty_model_list_rejected() {
        let result = RuntimeConfig::from_yaml("models: []\n");
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("model")));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let result = RuntimeConfig::from_yaml("provider:\n  type: groq\n  base_url: api.groq.com\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = RuntimeConfig::from_yaml("completion:\n  call_timeout: soon\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = RuntimeConfig::from_yaml_file("/nonexistent/vitalis.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_unknown_provider_fails_chain_build() {
        let config = RuntimeConfig {
            provider: ProviderSection {
                kind: "carrier-pigeon".to_string(),
                base_url: None,
            },
            ..RuntimeConfig::default()
        };
        let result = config.build_chain(&ProviderRegistry::new());
        assert!(matches!(result, Err(ConfigError::Provider(_))));
    }

    #[test]
    fn test_validate_with_reports_unknown_provider() {
        let config = RuntimeConfig {
            provider: ProviderSection {
                kind: "carrier-pigeon".to_string(),
                base_url: None,
            },
            ..RuntimeConfig::default()
        };
        match config.validate_with(&ProviderRegistry::new()) {
            Err(ConfigError::Provider(ProviderError::NotConfigured(msg))) => {
                assert!(msg.contains("carrier-pigeon"));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_yaml_round_trip_keeps_human_durations() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("base_delay: 2s"));
        assert!(yaml.contains("call_timeout: 30s"));
    }

    #[test]
    fn test_completion_config_for_model() {
        let config = CompletionSettings::default().for_model("mixtral-8x7b-32768");
        assert_eq!(config.model, "mixtral-8x7b-32768");
        assert!(config.json_response);
        assert_eq!(config.temperature, 0.6);
    }
}
