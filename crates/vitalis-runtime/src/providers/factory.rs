//! Name-to-constructor table for backends.
//!
//! `provider.type` in the runtime configuration selects a factory here;
//! the factory turns the provider options into a shared [`LlmProvider`].
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let groq = registry.create("groq", &serde_json::json!({"api_key": "gsk_..."}))?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};

/// Builds one kind of backend from provider options.
pub trait ProviderFactory: Send + Sync {
    /// Value of `provider.type` that selects this factory.
    fn provider_type(&self) -> &'static str;

    fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Check the options (credentials, URLs) without building anything.
    fn validate_config(&self, options: &JsonValue) -> Result<(), ProviderError>;
}

/// Factories by provider type. Iteration order is alphabetical.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every backend compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "groq")]
        registry.register(Arc::new(super::ChatCompletionsFactory::groq()));

        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::ChatCompletionsFactory::openai()));

        registry
    }

    /// Add a factory. A later factory with the same type replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider_type(), factory);
    }

    pub fn create(&self, provider_type: &str, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(provider_type)?.create(options)
    }

    pub fn validate(&self, provider_type: &str, options: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(options)
    }

    pub fn available_types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    fn factory(&self, provider_type: &str) -> Result<&dyn ProviderFactory, ProviderError> {
        match self.factories.get(provider_type) {
            Some(factory) => Ok(factory.as_ref()),
            None => Err(ProviderError::NotConfigured(format!(
                "no provider named '{}' in this build (available: {})",
                provider_type,
                self.available_types().join(", ")
            ))),
        }
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, TokenUsage};
    use async_trait::async_trait;

    struct ClinicProvider {
        clinic: String,
    }

    #[async_trait]
    impl LlmProvider for ClinicProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: r#"{"response": "ok"}"#.to_string(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            &self.clinic
        }
    }

    struct ClinicFactory;

    impl ProviderFactory for ClinicFactory {
        fn provider_type(&self) -> &'static str {
            "clinic"
        }

        fn create(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            self.validate_config(options)?;
            let clinic = options["clinic"].as_str().unwrap_or("default").to_string();
            Ok(Arc::new(ClinicProvider { clinic }))
        }

        fn validate_config(&self, options: &JsonValue) -> Result<(), ProviderError> {
            match options.get("clinic") {
                Some(clinic) if !clinic.is_string() => Err(ProviderError::NotConfigured(
                    "clinic must be a string".to_string(),
                )),
                _ => Ok(()),
            }
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ClinicFactory));
        registry
    }

    #[test]
    fn test_create_by_type() {
        let registry = registry();
        assert_eq!(registry.available_types(), vec!["clinic"]);

        let provider = registry
            .create("clinic", &serde_json::json!({"clinic": "north-ward"}))
            .unwrap();
        assert_eq!(provider.name(), "north-ward");
    }

    #[test]
    fn test_unknown_type_lists_available() {
        match registry().create("fax", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("'fax'"));
                assert!(msg.contains("available: clinic"));
            }
            _ => panic!("expected NotConfigured"),
        }
    }

    #[test]
    fn test_validate_without_creating() {
        let registry = registry();
        assert!(registry.validate("clinic", &serde_json::json!({})).is_ok());
        assert!(registry.validate("clinic", &serde_json::json!({"clinic": 3})).is_err());
        assert!(registry.validate("fax", &serde_json::json!({})).is_err());
    }

    #[test]
    fn test_debug_lists_types() {
        assert_eq!(format!("{:?}", registry()), r#"["clinic"]"#);
    }

    #[cfg(feature = "groq")]
    #[test]
    fn test_defaults_include_groq() {
        assert!(ProviderRegistry::with_defaults().available_types().contains(&"groq"));
    }
}
