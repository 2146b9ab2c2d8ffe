//! The decision engine: one entry point per clinical request.
//!
//! # Execution Flow
//! 1. Chat only: the safety filter may short-circuit with the emergency protocol
//! 2. Local evidence (deterministic)
//! 3. Prompt composition
//! 4. Fallback-chain orchestration
//! 5. Synthesis of the final result

use std::time::Duration;

use vitalis_core::{
    ClinicalRequest, DeterministicRiskScorer, LocalEvidence, Operation, ReferencePopulation,
    SafetyFilter, SynthesizedResult,
};

use crate::config::RuntimeConfig;
use crate::orchestrator::{ModelAttempt, RequestOrchestrator};
use crate::prompts::PromptComposer;
use crate::providers::ProviderRegistry;
use crate::resilience::FallbackChain;
use crate::synthesizer::ResponseSynthesizer;
use crate::RuntimeError;

/// A result plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct Decision {
    pub result: SynthesizedResult,
    pub evidence: LocalEvidence,
    /// Backend attempts in order; empty for safety-filter hits
    pub attempts: Vec<ModelAttempt>,
}

/// Hybrid decision engine. Read-only after construction; share it behind an
/// `Arc` to serve concurrent requests.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    scorer: DeterministicRiskScorer,
    safety: SafetyFilter,
    composer: PromptComposer,
    orchestrator: RequestOrchestrator,
    synthesizer: ResponseSynthesizer,
}

impl DecisionEngine {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        let scorer = DeterministicRiskScorer::new();
        Self {
            synthesizer: ResponseSynthesizer::with_scorer(scorer.clone()),
            scorer,
            safety: SafetyFilter::new(),
            composer: PromptComposer::new(),
            orchestrator,
        }
    }

    pub fn builder() -> DecisionEngineBuilder {
        DecisionEngineBuilder::new()
    }

    /// Create the provider named in `config` and build an engine over it.
    pub fn from_config(config: &RuntimeConfig, registry: &ProviderRegistry) -> Result<Self, RuntimeError> {
        let chain = config.build_chain(registry)?;
        Self::builder().config(config.clone()).chain(chain).build()
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    /// Local evidence for a request, without any backend call.
    pub fn assess(&self, request: &ClinicalRequest) -> LocalEvidence {
        self.scorer.assess(request)
    }

    /// Decide a request. Never fails: degraded paths are explicit in
    /// [`SynthesizedResult::source`].
    pub async fn decide(&self, request: &ClinicalRequest) -> SynthesizedResult {
        self.decide_with_trace(request, None).await.result
    }

    /// Decide a request within a caller deadline that overrides the
    /// configured one.
    pub async fn decide_within(&self, request: &ClinicalRequest, deadline: Duration) -> SynthesizedResult {
        self.decide_with_trace(request, Some(deadline)).await.result
    }

    /// Decide a request and keep the evidence and attempt log.
    pub async fn decide_with_trace(&self, request: &ClinicalRequest, deadline: Option<Duration>) -> Decision {
        match request.operation() {
            Operation::Chat => {
                if let Some(verdict) = self.safety.check(request.text()) {
                    return Decision {
                        result: self.synthesizer.emergency_protocol(&verdict),
                        evidence: LocalEvidence::default(),
                        attempts: Vec::new(),
                    };
                }
                self.remote_assisted(request, deadline).await
            }
            Operation::Triage
            | Operation::DemandForecast
            | Operation::GrowthAnalysis
            | Operation::Summarize => self.remote_assisted(request, deadline).await,
        }
    }

    async fn remote_assisted(&self, request: &ClinicalRequest, deadline: Option<Duration>) -> Decision {
        let evidence = self.scorer.assess(request);
        let prompt = self.composer.compose(request, &evidence);

        let orchestration = match deadline {
            Some(deadline) => self.orchestrator.execute_within(&prompt, deadline).await,
            None => self.orchestrator.execute(&prompt).await,
        };

        let result = self
            .synthesizer
            .synthesize(request, &evidence, &orchestration.outcome);

        tracing::info!(
            operation = %request.operation(),
            source = %result.source,
            model = %result.model,
            attempts = orchestration.attempts.len(),
            "Decision complete"
        );

        Decision {
            result,
            evidence,
            attempts: orchestration.attempts,
        }
    }
}

/// Builder for [`DecisionEngine`].
#[derive(Debug, Default)]
pub struct DecisionEngineBuilder {
    chain: Option<FallbackChain>,
    config: RuntimeConfig,
    reference: Option<ReferencePopulation>,
}

impl DecisionEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend chain.
    pub fn chain(mut self, chain: FallbackChain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set retry, completion and deadline settings. The model list in the
    /// config is ignored when a chain is set explicitly.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Reference population for the triage anomaly index.
    pub fn reference_population(mut self, reference: ReferencePopulation) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn build(self) -> Result<DecisionEngine, RuntimeError> {
        let chain = self.chain.ok_or(RuntimeError::NoBackends)?;
        if chain.is_empty() {
            return Err(RuntimeError::NoBackends);
        }

        let orchestrator = RequestOrchestrator::builder()
            .chain(chain)
            .retry(self.config.retry)
            .completion(self.config.completion.clone())
            .deadline(self.config.request_deadline)
            .build();

        let mut engine = DecisionEngine::new(orchestrator);
        if let Some(reference) = self.reference {
            engine.scorer = DeterministicRiskScorer::with_reference(reference);
            engine.synthesizer = ResponseSynthesizer::with_scorer(engine.scorer.clone());
        }
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use vitalis_core::Source;

    struct EchoProvider {
        calls: AtomicUsize,
        content: &'static str,
    }

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: self.content.to_string(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn engine_with(content: &'static str) -> (DecisionEngine, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider {
            calls: AtomicUsize::new(0),
            content,
        });
        let engine = DecisionEngine::builder()
            .chain(FallbackChain::default_chain(provider.clone()))
            .build()
            .unwrap();
        (engine, provider)
    }

    #[test]
    fn test_builder_requires_backends() {
        assert!(matches!(
            DecisionEngine::builder().build(),
            Err(RuntimeError::NoBackends)
        ));
        assert!(matches!(
            DecisionEngine::builder().chain(FallbackChain::new()).build(),
            Err(RuntimeError::NoBackends)
        ));
    }

    #[test]
    fn test_from_config_reports_unknown_provider() {
        let result = DecisionEngine::from_config(&RuntimeConfig::default(), &ProviderRegistry::new());
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_chat_remote_path() {
        let (engine, provider) = engine_with(r#"{"response": "Rest and hydrate.", "confidence": 0.9}"#);

        let decision = engine
            .decide_with_trace(&ClinicalRequest::chat("I have a mild cold"), None)
            .await;

        assert_eq!(decision.result.source, Source::Remote);
        assert_eq!(decision.result.narrative, "Rest and hydrate.");
        assert_eq!(decision.attempts.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_safety_filter_skips_backends() {
        let (engine, provider) = engine_with(r#"{"response": "unused"}"#);

        let decision = engine
            .decide_with_trace(&ClinicalRequest::chat("creo que es un infarto"), None)
            .await;

        assert_eq!(decision.result.source, Source::SecurityFilter);
        assert!(decision.attempts.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_safety_filter_only_guards_chat() {
        let (engine, provider) = engine_with(r#"{"summary": "Emergency visit documented."}"#);

        let result = engine
            .decide(&ClinicalRequest::summarize("Emergency visit for chest pain.", None))
            .await;

        assert_eq!(result.source, Source::Remote);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_assess_is_local() {
        let (engine, provider) = engine_with("{}");
        let evidence = engine.assess(&ClinicalRequest::demand_forecast("X", vec![1.0, 3.0]));

        assert_eq!(evidence.series.unwrap().mean, 2.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
