//! Chat-completion backends.
//!
//! The orchestrator only sees [`LlmProvider`]. Concrete backends are created
//! by name through the [`ProviderRegistry`]; the OpenAI-compatible one (Groq,
//! OpenAI) is compiled in with the `groq` / `openai` features.
//!
//! API keys are held as [`ApiCredential`] and never appear in `Debug` output
//! or logs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(any(feature = "groq", feature = "openai"))]
mod chat_completions;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(any(feature = "groq", feature = "openai"))]
pub use chat_completions::{ChatCompletionsFactory, ChatCompletionsFlavor, ChatCompletionsProvider};

/// Why a backend call did not produce text.
///
/// The orchestrator treats every variant as transient: it retries, then
/// moves on to the next model. Only [`ProviderError::NotConfigured`] also
/// surfaces at startup, through the registry.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    HttpError(String),

    #[error("backend is rate limiting (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("backend returned status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("unreadable backend response: {0}")]
    ParseError(String),

    #[error("model '{0}' returned no content")]
    EmptyResponse(String),

    #[error("backend rejected the API key")]
    AuthError,

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("provider misconfigured: {0}")]
    NotConfigured(String),
}

/// Per-call settings handed to [`LlmProvider::complete`].
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound for this single call
    pub timeout: Duration,
    /// Send the `response_format: json_object` hint
    pub json_response: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".to_string(),
            max_tokens: 2048,
            temperature: 0.6,
            timeout: Duration::from_secs(30),
            json_response: true,
        }
    }
}

/// Author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Text produced by a backend, before any JSON extraction.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model id as reported by the backend, which may differ from the requested alias
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Token accounting reported by the backend; zero when it reports none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// A chat-completion backend.
///
/// Implementations must be safe to share between concurrently handled
/// requests: one call must not depend on state left by another.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send `messages` and return the raw text of the first choice.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap readiness check that does not spend tokens.
    async fn health_check(&self) -> bool;

    /// Name used in logs and attempt records.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::system("You are a triage assistant.")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(ChatMessage::user("Patient reports fever.").role, Role::User);
    }

    #[test]
    fn test_token_usage_total_saturates() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        assert_eq!(usage.total(), 150);

        let huge = TokenUsage {
            prompt_tokens: u32::MAX,
            completion_tokens: 1,
        };
        assert_eq!(huge.total(), u32::MAX);
    }

    #[test]
    fn test_completion_config_defaults_request_json() {
        let config = CompletionConfig::default();
        assert!(config.json_response);
        assert_eq!(config.max_tokens, 2048);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ProviderError::EmptyResponse("llama-3.1-8b-instant".to_string()).to_string(),
            "model 'llama-3.1-8b-instant' returned no content"
        );
        assert_eq!(
            ProviderError::ApiError {
                status: 503,
                message: "overloaded".to_string()
            }
            .to_string(),
            "backend returned status 503: overloaded"
        );
    }
}
