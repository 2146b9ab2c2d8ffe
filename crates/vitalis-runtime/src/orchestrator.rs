//! Request orchestration over the fallback chain.
//!
//! For each backend in chain order the orchestrator makes up to
//! `1 + max_retries` attempts, sleeping with exponential backoff between
//! attempts on the same model and moving to the next model immediately once
//! a model is exhausted. Every attempt is bounded by the per-call timeout;
//! an optional deadline bounds the whole walk.
//!
//! [`RequestOrchestrator::execute`] never fails: when no backend produces a
//! usable JSON object the caller gets a [`FallbackPayload`] instead.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CompletionSettings;
use crate::extractor::{Extraction, JsonObject, SafeJsonExtractor};
use crate::prompts::ComposedPrompt;
use crate::providers::ChatMessage;
use crate::resilience::{BackendSlot, FallbackChain, RetryPolicy};

/// Confidence of every locally produced fallback result.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Model tag stamped on locally produced fallback results.
pub const FALLBACK_MODEL: &str = "local-fallback";

/// Narrative of the generic fallback payload.
pub const FALLBACK_NARRATIVE: &str =
    "The AI engine is temporarily unavailable. Operating in local backup mode.";

/// Outcome of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Carries the token count reported by the backend
    Success { tokens: u32 },
    /// Network error, timeout, non-2xx status or empty payload
    TransientFailure { reason: String },
    /// The backend answered but no JSON object could be extracted
    ParseFailure,
}

/// Diagnostic record of one attempt. Never part of the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelAttempt {
    pub provider: String,
    pub model: String,
    /// 1-based, per model
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

/// Why the orchestrator fell back to local output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The chain has no backends
    EmptyChain,
    /// Every attempt on every model failed
    Exhausted,
    /// The caller's deadline expired mid-walk
    DeadlineExpired,
}

/// Fixed local payload returned when no backend succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackPayload {
    pub narrative: String,
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub model: String,
    pub reason: FallbackReason,
}

impl FallbackPayload {
    pub fn new(reason: FallbackReason) -> Self {
        Self {
            narrative: FALLBACK_NARRATIVE.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            suggestions: vec!["Retry shortly".to_string(), "See local help".to_string()],
            model: FALLBACK_MODEL.to_string(),
            reason,
        }
    }
}

/// Remote answer or local fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationOutcome {
    Remote { payload: JsonObject, model: String },
    Fallback(FallbackPayload),
}

impl OrchestrationOutcome {
    pub fn is_remote(&self) -> bool {
        matches!(self, OrchestrationOutcome::Remote { .. })
    }
}

/// Outcome plus the attempt log.
#[derive(Debug, Clone)]
pub struct Orchestration {
    pub outcome: OrchestrationOutcome,
    pub attempts: Vec<ModelAttempt>,
}

/// Walks the fallback chain for one request at a time.
///
/// Holds only read-only state, so one instance can serve concurrent
/// requests.
#[derive(Debug, Clone)]
pub struct RequestOrchestrator {
    chain: FallbackChain,
    retry: RetryPolicy,
    completion: CompletionSettings,
    deadline: Option<Duration>,
    extractor: SafeJsonExtractor,
}

impl RequestOrchestrator {
    pub fn new(chain: FallbackChain, retry: RetryPolicy, completion: CompletionSettings) -> Self {
        Self {
            chain,
            retry,
            completion,
            deadline: None,
            extractor: SafeJsonExtractor::new(),
        }
    }

    pub fn builder() -> RequestOrchestratorBuilder {
        RequestOrchestratorBuilder::new()
    }

    /// Bound every [`execute`](Self::execute) call by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Upper bound on the time a walk can take without a deadline.
    pub fn worst_case_latency(&self) -> Duration {
        let per_model = self.completion.call_timeout * self.retry.max_attempts()
            + self.retry.total_delay();
        per_model * self.chain.len() as u32
    }

    /// Walk the chain, honoring the configured deadline if any.
    pub async fn execute(&self, prompt: &ComposedPrompt) -> Orchestration {
        match self.deadline {
            Some(deadline) => self.execute_within(prompt, deadline).await,
            None => {
                let mut attempts = Vec::new();
                let outcome = self.walk_chain(prompt, &mut attempts).await;
                Orchestration { outcome, attempts }
            }
        }
    }

    /// Walk the chain, abandoning the in-flight attempt once `deadline` elapses.
    pub async fn execute_within(&self, prompt: &ComposedPrompt, deadline: Duration) -> Orchestration {
        let mut attempts = Vec::new();
        let outcome = match tokio::time::timeout(deadline, self.walk_chain(prompt, &mut attempts)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    operation = %prompt.operation,
                    deadline = ?deadline,
                    "Request deadline expired, using local fallback"
                );
                OrchestrationOutcome::Fallback(FallbackPayload::new(FallbackReason::DeadlineExpired))
            }
        };
        Orchestration { outcome, attempts }
    }

    async fn walk_chain(
        &self,
        prompt: &ComposedPrompt,
        attempts: &mut Vec<ModelAttempt>,
    ) -> OrchestrationOutcome {
        if self.chain.is_empty() {
            tracing::warn!(operation = %prompt.operation, "Fallback chain is empty");
            return OrchestrationOutcome::Fallback(FallbackPayload::new(FallbackReason::EmptyChain));
        }

        let messages = prompt.messages();

        for slot in self.chain.slots() {
            let mut delays = self.retry.backoff();
            let mut attempt = 1u32;

            loop {
                let started = Instant::now();
                let result = self.attempt(slot, &messages).await;
                let latency = started.elapsed();

                match result {
                    Ok((payload, tokens)) => {
                        tracing::info!(
                            operation = %prompt.operation,
                            provider = slot.provider().name(),
                            model = slot.model(),
                            attempt,
                            tokens,
                            latency = ?latency,
                            "Backend answered"
                        );
                        attempts.push(ModelAttempt {
                            provider: slot.provider().name().to_string(),
                            model: slot.model().to_string(),
                            attempt,
                            outcome: AttemptOutcome::Success { tokens },
                            latency,
                        });
                        return OrchestrationOutcome::Remote {
                            payload,
                            model: slot.model().to_string(),
                        };
                    }
                    Err(outcome) => {
                        tracing::warn!(
                            operation = %prompt.operation,
                            provider = slot.provider().name(),
                            model = slot.model(),
                            attempt,
                            outcome = ?outcome,
                            "Backend attempt failed"
                        );
                        attempts.push(ModelAttempt {
                            provider: slot.provider().name().to_string(),
                            model: slot.model().to_string(),
                            attempt,
                            outcome,
                            latency,
                        });
                    }
                }

                match delays.next() {
                    Some(delay) => {
                        tracing::debug!(model = slot.model(), delay = ?delay, "Backing off before retry");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::info!(model = slot.model(), attempts = attempt, "Model exhausted, advancing");
                        break;
                    }
                }
            }
        }

        tracing::error!(
            operation = %prompt.operation,
            models = ?self.chain.models(),
            "All backends exhausted, using local fallback"
        );
        OrchestrationOutcome::Fallback(FallbackPayload::new(FallbackReason::Exhausted))
    }

    async fn attempt(
        &self,
        slot: &BackendSlot,
        messages: &[ChatMessage],
    ) -> Result<(JsonObject, u32), AttemptOutcome> {
        let config = self.completion.for_model(slot.model());
        let call = slot.provider().complete(messages.to_vec(), &config);

        let response = match tokio::time::timeout(config.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(AttemptOutcome::TransientFailure {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(AttemptOutcome::TransientFailure {
                    reason: format!("timed out after {:?}", config.timeout),
                })
            }
        };

        if response.content.trim().is_empty() {
            return Err(AttemptOutcome::TransientFailure {
                reason: "empty payload".to_string(),
            });
        }

        match self.extractor.extract(&response.content) {
            Extraction::Parsed(payload) => Ok((payload, response.usage.total())),
            Extraction::Failed { .. } => Err(AttemptOutcome::ParseFailure),
        }
    }
}

/// Builder for [`RequestOrchestrator`].
#[derive(Debug, Default)]
pub struct RequestOrchestratorBuilder {
    chain: FallbackChain,
    retry: RetryPolicy,
    completion: CompletionSettings,
    deadline: Option<Duration>,
}

impl RequestOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FallbackChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn completion(mut self, completion: CompletionSettings) -> Self {
        self.completion = completion;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn build(self) -> RequestOrchestrator {
        RequestOrchestrator {
            chain: self.chain,
            retry: self.retry,
            completion: self.completion,
            deadline: self.deadline,
            extractor: SafeJsonExtractor::new(),
        }
    }
}
