//! Ordered chain of remote backends.

use std::fmt;
use std::sync::Arc;

use crate::providers::LlmProvider;

/// Model identifiers tried in order when no chain is configured.
pub const DEFAULT_MODELS: [&str; 3] = [
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
    "mixtral-8x7b-32768",
];

/// One (provider, model) pair in the chain.
#[derive(Clone)]
pub struct BackendSlot {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl BackendSlot {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSlot")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Fallback chain - tried in order, first success wins.
///
/// The chain is read-only once built and may be shared between concurrent
/// requests.
#[derive(Debug, Clone, Default)]
pub struct FallbackChain {
    slots: Vec<BackendSlot>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backend to the chain.
    pub fn add(mut self, provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        self.slots.push(BackendSlot::new(provider, model));
        self
    }

    /// One provider serving several models, in the given order.
    pub fn from_models<I, S>(provider: Arc<dyn LlmProvider>, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        models
            .into_iter()
            .fold(Self::new(), |chain, model| chain.add(Arc::clone(&provider), model))
    }

    /// The default three-model chain on a single provider.
    pub fn default_chain(provider: Arc<dyn LlmProvider>) -> Self {
        Self::from_models(provider, DEFAULT_MODELS)
    }

    pub fn slots(&self) -> &[BackendSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Model identifiers in chain order.
    pub fn models(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.model()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, ProviderError};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl LlmProvider for Offline {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Err(ProviderError::HttpError("offline".to_string()))
        }

        async fn health_check(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    #[test]
    fn test_default_chain_order() {
        let chain = FallbackChain::default_chain(Arc::new(Offline));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.models(), DEFAULT_MODELS.to_vec());
        assert_eq!(chain.slots()[0].provider().name(), "offline");
    }

    #[test]
    fn test_builder_appends_in_order() {
        let provider: Arc<dyn LlmProvider> = Arc::new(Offline);
        let chain = FallbackChain::new()
            .add(Arc::clone(&provider), "primary")
            .add(provider, "secondary");

        assert_eq!(chain.models(), vec!["primary", "secondary"]);
        assert!(format!("{:?}", chain).contains("secondary"));
    }

    #[test]
    fn test_empty_chain() {
        let chain = FallbackChain::from_models(Arc::new(Offline), Vec::<String>::new());
        assert!(chain.is_empty());
    }
}
