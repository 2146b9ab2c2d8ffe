//! OpenAI-compatible chat completions provider.
//!
//! Groq and OpenAI expose the same `/chat/completions` wire format, so one
//! implementation serves both; a [`ChatCompletionsFlavor`] carries the
//! per-vendor defaults (endpoint, key variable, default model).
//!
//! ## Security
//!
//! Keys are held in an [`ApiCredential`] and only exposed when the
//! `Authorization` header is set.

use super::{
    factory::ProviderFactory,
    secrets::ApiCredential,
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Vendor defaults for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatCompletionsFlavor {
    /// Registry key, also used as the provider name in logs
    pub provider_type: &'static str,
    pub env_var: &'static str,
    pub credential_name: &'static str,
    pub default_base_url: &'static str,
}

impl ChatCompletionsFlavor {
    pub const GROQ: Self = Self {
        provider_type: "groq",
        env_var: "GROQ_API_KEY",
        credential_name: "Groq API key",
        default_base_url: "https://api.groq.com/openai/v1",
    };

    pub const OPENAI: Self = Self {
        provider_type: "openai",
        env_var: "OPENAI_API_KEY",
        credential_name: "OpenAI API key",
        default_base_url: "https://api.openai.com/v1",
    };
}

/// Provider for any OpenAI-compatible `/chat/completions` endpoint.
///
/// The HTTP client is created once per provider and shared by every request
/// routed through it.
pub struct ChatCompletionsProvider {
    flavor: ChatCompletionsFlavor,
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ChatCompletionsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsProvider")
            .field("provider", &self.flavor.provider_type)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ChatCompletionsProvider {
    /// Create a provider with an explicit key and the vendor's default endpoint.
    pub fn new(flavor: ChatCompletionsFlavor, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let credential = ApiCredential::inline(api_key, flavor.credential_name);
        Self::with_credential(flavor, credential, flavor.default_base_url.to_string())
    }

    /// Create a provider from JSON options, falling back to the environment
    /// for the key.
    pub fn from_config(flavor: ChatCompletionsFlavor, config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(config, flavor.env_var, flavor.credential_name)?;
        tracing::debug!(provider = flavor.provider_type, credential = %credential, "Credential resolved");

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(flavor.default_base_url)
            .trim_end_matches('/')
            .to_string();

        Self::with_credential(flavor, credential, base_url)
    }

    fn with_credential(
        flavor: ChatCompletionsFlavor,
        credential: ApiCredential,
        base_url: String,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProviderError::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            flavor,
            credential,
            base_url,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatCompletionRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            response_format: config.json_response.then_some(ResponseFormat {
                type_: "json_object",
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&raw)
                .map(|body| body.error.message)
                .unwrap_or(raw);

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse(config.model.clone()))?;

        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse(config.model.clone()));
        }

        Ok(CompletionResponse {
            content,
            usage,
            model: body.model.unwrap_or_else(|| config.model.clone()),
            stop_reason: choice.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_blank()
    }

    fn name(&self) -> &str {
        self.flavor.provider_type
    }
}

/// Factory for OpenAI-compatible providers.
///
/// ## Options
/// ```json
/// {
///   "api_key": "gsk_...",                          // Optional, falls back to the vendor env var
///   "base_url": "https://api.groq.com/openai/v1"   // Optional
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChatCompletionsFactory {
    flavor: ChatCompletionsFlavor,
}

impl ChatCompletionsFactory {
    pub fn new(flavor: ChatCompletionsFlavor) -> Self {
        Self { flavor }
    }

    pub fn groq() -> Self {
        Self::new(ChatCompletionsFlavor::GROQ)
    }

    pub fn openai() -> Self {
        Self::new(ChatCompletionsFlavor::OPENAI)
    }
}

impl ProviderFactory for ChatCompletionsFactory {
    fn provider_type(&self) -> &'static str {
        self.flavor.provider_type
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.validate_config(config)?;
        let provider = ChatCompletionsProvider::from_config(self.flavor, config)?;
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, self.flavor.env_var) {
            return Err(ProviderError::NotConfigured(format!(
                "{} required: set 'api_key' in provider options or {} env",
                self.flavor.credential_name, self.flavor.env_var
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }
}
