//! # vitalis-runtime
//!
//! Remote-assisted half of the Vitalis clinical decision engine.
//!
//! Every request is first assessed locally by `vitalis-core`. This crate then
//! asks a chain of chat-completion backends to refine that assessment, and
//! merges whatever comes back with the local evidence.
//!
//! ## Guarantees
//!
//! - A decision always completes. When every backend fails, times out or
//!   answers with unusable text, the caller gets a local fallback result
//!   tagged `local_fallback` with confidence 0.5.
//! - Chat messages mentioning an emergency never reach a backend.
//! - Nothing is shared between requests except read-only configuration and
//!   the HTTP client.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vitalis_runtime::{DecisionEngine, ProviderRegistry, RuntimeConfig};
//! use vitalis_core::ClinicalRequest;
//!
//! let config = RuntimeConfig::from_yaml_file("vitalis.yaml")?;
//! let engine = DecisionEngine::from_config(&config, &ProviderRegistry::with_defaults())?;
//!
//! let result = engine.decide(&ClinicalRequest::chat("I have a headache")).await;
//! println!("{} ({})", result.narrative, result.source);
//! ```

pub mod config;
pub mod engine;
pub mod extractor;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod synthesizer;

pub use config::{CompletionSettings, ConfigError, ProviderSection, RuntimeConfig};
pub use engine::{Decision, DecisionEngine, DecisionEngineBuilder};
pub use extractor::{Extraction, JsonObject, SafeJsonExtractor};
pub use orchestrator::{
    AttemptOutcome, FallbackPayload, FallbackReason, ModelAttempt, Orchestration,
    OrchestrationOutcome, RequestOrchestrator, RequestOrchestratorBuilder, FALLBACK_CONFIDENCE,
    FALLBACK_MODEL,
};
pub use prompts::{ComposedPrompt, FieldKind, OutputSchema, PromptComposer};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry, Role, TokenUsage,
};
pub use resilience::{BackendSlot, FallbackChain, RetryPolicy};
pub use synthesizer::ResponseSynthesizer;

use thiserror::Error;

/// Errors from engine construction.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("No backends configured: the fallback chain is empty")]
    NoBackends,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RuntimeError::NoBackends.to_string(),
            "No backends configured: the fallback chain is empty"
        );

        let err: RuntimeError = ConfigError::Invalid("at least one model is required".to_string()).into();
        assert!(err.to_string().contains("at least one model"));
    }
}
