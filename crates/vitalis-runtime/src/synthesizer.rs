//! Merges remote payloads with local evidence into the final result.
//!
//! A remote field is used only when it is present, non-null and matches
//! the type in the operation's [`OutputSchema`] (confidences must also lie
//! in [0, 1], scores in [0, 100], counts must be non-negative). Anything else
//! is replaced by the local value or a static default. Provenance is always
//! stamped.

use serde_json::Value as JsonValue;

use vitalis_core::{intents, knowledge};
use vitalis_core::safety::{SafetyVerdict, EMERGENCY_PROTOCOL_MESSAGE, EMERGENCY_SUGGESTIONS};
use vitalis_core::{
    ClinicalRequest, DeterministicRiskScorer, LocalEvidence, MonthlyProjection, Operation,
    Priority, ResultDetail, RiskAssessment, SeriesSummary, Source, SynthesizedResult,
};

use crate::extractor::JsonObject;
use crate::orchestrator::{FallbackPayload, OrchestrationOutcome, FALLBACK_CONFIDENCE};
use crate::prompts::OutputSchema;

/// Triage notes shorter than this get a local explanation appended.
pub const MIN_TRIAGE_NOTES_CHARS: usize = 50;

/// Model tag stamped on emergency-protocol results.
pub const SAFETY_FILTER_MODEL: &str = "safety-filter";

const STRATEGIC_HEADING: &str = "### Strategic analysis\n\n";
const EMERGENCY_SUMMARY_HEADING: &str = "### [EMERGENCY SUMMARY]\n";
const SUMMARY_TRUNCATION_MARGIN: usize = 30;

const DEFAULT_DEMAND: u64 = 100;
const DEFAULT_REVENUE_BASELINE: f64 = 5000.0;

const REMOTE_TRIAGE_CONFIDENCE: f64 = 0.95;
const REMOTE_CHAT_CONFIDENCE: f64 = 0.95;
const REMOTE_DEMAND_CONFIDENCE: f64 = 0.85;
const REMOTE_GROWTH_ACCURACY: f64 = 0.8;
const REMOTE_SUMMARY_CONFIDENCE: f64 = 0.9;

/// Typed, schema-checked view of a remote payload.
struct RemoteFields<'a> {
    payload: &'a JsonObject,
    schema: OutputSchema,
}

impl<'a> RemoteFields<'a> {
    fn new(payload: &'a JsonObject, operation: Operation) -> Self {
        Self {
            payload,
            schema: OutputSchema::for_operation(operation),
        }
    }

    fn value(&self, name: &str) -> Option<&'a JsonValue> {
        let spec = self.schema.field(name)?;
        let value = self.payload.get(name)?;
        spec.kind.accepts(value).then_some(value)
    }

    fn text(&self, name: &str) -> Option<String> {
        self.value(name)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn unit_interval(&self, name: &str) -> Option<f64> {
        self.value(name)?
            .as_f64()
            .filter(|c| (0.0..=1.0).contains(c))
    }

    fn number(&self, name: &str) -> Option<f64> {
        self.value(name)?.as_f64()
    }

    fn count(&self, name: &str) -> Option<u64> {
        self.value(name)?.as_u64()
    }

    fn score(&self) -> Option<u8> {
        self.count("score")
            .filter(|s| *s <= 100)
            .map(|s| s as u8)
    }

    fn list(&self, name: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .value(name)?
            .as_array()?
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Some(items)
    }

    fn projections(&self) -> Option<Vec<MonthlyProjection>> {
        let value = self.value("predictions")?.clone();
        let projections: Vec<MonthlyProjection> = serde_json::from_value(value).ok()?;
        (!projections.is_empty()).then(|| {
            projections
                .into_iter()
                .map(|p| MonthlyProjection {
                    confidence: p.confidence.clamp(0.0, 1.0),
                    ..p
                })
                .collect()
        })
    }
}

/// Builds the caller-facing result for every path through the engine.
#[derive(Debug, Clone, Default)]
pub struct ResponseSynthesizer {
    scorer: DeterministicRiskScorer,
}

impl ResponseSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the same scorer as the engine when local evidence has to be
    /// recomputed.
    pub fn with_scorer(scorer: DeterministicRiskScorer) -> Self {
        Self { scorer }
    }

    /// Merge an orchestration outcome with the local evidence.
    pub fn synthesize(
        &self,
        request: &ClinicalRequest,
        evidence: &LocalEvidence,
        outcome: &OrchestrationOutcome,
    ) -> SynthesizedResult {
        let result = match outcome {
            OrchestrationOutcome::Remote { payload, model } => {
                let fields = RemoteFields::new(payload, request.operation());
                self.merge_remote(request, evidence, &fields, model)
            }
            OrchestrationOutcome::Fallback(fallback) => self.local_fallback(request, evidence, fallback),
        };
        finalize(result)
    }

    /// Fixed emergency protocol returned by the chat safety filter.
    pub fn emergency_protocol(&self, verdict: &SafetyVerdict) -> SynthesizedResult {
        tracing::info!(categories = ?verdict.categories, "Returning emergency protocol");
        SynthesizedResult {
            narrative: EMERGENCY_PROTOCOL_MESSAGE.to_string(),
            confidence: 1.0,
            suggestions: EMERGENCY_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
            source: Source::SecurityFilter,
            model: SAFETY_FILTER_MODEL.to_string(),
            detail: ResultDetail::Chat,
        }
    }

    fn risk(&self, request: &ClinicalRequest, evidence: &LocalEvidence) -> RiskAssessment {
        evidence
            .risk
            .clone()
            .unwrap_or_else(|| self.scorer.score(request.vitals(), request.age()))
    }

    fn merge_remote(
        &self,
        request: &ClinicalRequest,
        evidence: &LocalEvidence,
        fields: &RemoteFields<'_>,
        model: &str,
    ) -> SynthesizedResult {
        let (narrative, confidence, suggestions, detail) = match request.operation() {
            Operation::Triage => {
                let risk = self.risk(request, evidence);
                let score = fields.score().unwrap_or(risk.score());
                let priority = fields
                    .text("priority")
                    .and_then(|p| parse_priority(&p))
                    .unwrap_or_else(|| Priority::from_score(score));

                let notes = match fields.text("notes") {
                    Some(notes) if notes.chars().count() < MIN_TRIAGE_NOTES_CHARS => {
                        format!("{}\n\n{}", notes, local_support_note(&risk))
                    }
                    Some(notes) => notes,
                    None => local_triage_explanation(&risk),
                };

                (
                    notes,
                    fields
                        .unit_interval("confidence")
                        .unwrap_or(REMOTE_TRIAGE_CONFIDENCE),
                    fields
                        .list("suggestions")
                        .unwrap_or_else(|| triage_suggestions(priority)),
                    triage_detail(score, priority, &risk),
                )
            }
            Operation::Chat => (
                fields.text("response").unwrap_or_else(|| {
                    "Sorry, I could not process that. Could you rephrase your question?".to_string()
                }),
                fields
                    .unit_interval("confidence")
                    .unwrap_or(REMOTE_CHAT_CONFIDENCE),
                fields.list("suggestions").unwrap_or_default(),
                ResultDetail::Chat,
            ),
            Operation::DemandForecast => (
                fields
                    .text("recommendation")
                    .unwrap_or_else(|| "Demand analysis completed.".to_string()),
                fields
                    .unit_interval("confidence")
                    .unwrap_or(REMOTE_DEMAND_CONFIDENCE),
                Vec::new(),
                ResultDetail::DemandForecast {
                    subject_id: request.subject_id().map(str::to_string),
                    predicted_demand: fields
                        .count("predicted_demand")
                        .unwrap_or_else(|| local_demand(evidence.series.as_ref())),
                    statistics: evidence.series.clone(),
                },
            ),
            Operation::GrowthAnalysis => {
                let accuracy = fields
                    .unit_interval("accuracy_score")
                    .unwrap_or(REMOTE_GROWTH_ACCURACY);
                let insight = fields
                    .text("insight")
                    .unwrap_or_else(|| "Growth analysis completed.".to_string());

                (
                    with_strategic_heading(insight),
                    accuracy,
                    Vec::new(),
                    ResultDetail::GrowthAnalysis {
                        predictions: fields
                            .projections()
                            .unwrap_or_else(|| local_projection(evidence.series.as_ref())),
                        projected_annual_growth: fields
                            .number("projected_annual_growth")
                            .unwrap_or_else(|| local_growth(evidence.series.as_ref())),
                        accuracy_score: accuracy,
                    },
                )
            }
            Operation::Summarize => {
                let summary = fields
                    .text("summary")
                    .unwrap_or_else(|| emergency_summary(request));
                (
                    summary.clone(),
                    REMOTE_SUMMARY_CONFIDENCE,
                    Vec::new(),
                    summary_detail(request, &summary, fields.list("clinical_entities")),
                )
            }
        };

        SynthesizedResult {
            narrative,
            confidence,
            suggestions,
            source: Source::Remote,
            model: model.to_string(),
            detail,
        }
    }

    fn local_fallback(
        &self,
        request: &ClinicalRequest,
        evidence: &LocalEvidence,
        fallback: &FallbackPayload,
    ) -> SynthesizedResult {
        let (narrative, suggestions, detail) = match request.operation() {
            Operation::Triage => {
                let risk = self.risk(request, evidence);
                let priority = risk.priority();
                (
                    format!("(Backup mode) {}", local_triage_explanation(&risk)),
                    triage_suggestions(priority),
                    triage_detail(risk.score(), priority, &risk),
                )
            }
            Operation::Chat => {
                let (narrative, suggestions) = local_chat_reply(request.text(), fallback);
                (narrative, suggestions, ResultDetail::Chat)
            }
            Operation::DemandForecast => (
                "Backup mode: forecast based on the historical average. A manual review of \
                 inventory levels is recommended."
                    .to_string(),
                Vec::new(),
                ResultDetail::DemandForecast {
                    subject_id: request.subject_id().map(str::to_string),
                    predicted_demand: local_demand(evidence.series.as_ref()),
                    statistics: evidence.series.clone(),
                },
            ),
            Operation::GrowthAnalysis => {
                let trend = evidence
                    .series
                    .as_ref()
                    .map(|s| format!(" Historical series: {}.", s.describe()))
                    .unwrap_or_default();
                (
                    format!(
                        "{}Backup mode analysis: the projection extends the recent average \
                         trend. Re-run when the remote engine is available for a full \
                         analysis.{}",
                        STRATEGIC_HEADING, trend
                    ),
                    Vec::new(),
                    ResultDetail::GrowthAnalysis {
                        predictions: local_projection(evidence.series.as_ref()),
                        projected_annual_growth: local_growth(evidence.series.as_ref()),
                        accuracy_score: FALLBACK_CONFIDENCE,
                    },
                )
            }
            Operation::Summarize => {
                let summary = emergency_summary(request);
                let detail = summary_detail(request, &summary, None);
                (summary, Vec::new(), detail)
            }
        };

        SynthesizedResult {
            narrative,
            confidence: fallback.confidence,
            suggestions,
            source: Source::LocalFallback,
            model: fallback.model.clone(),
            detail,
        }
    }
}

/// Offline chat answer: a known condition first, then a conversational
/// intent, then the plain backup note.
fn local_chat_reply(message: &str, fallback: &FallbackPayload) -> (String, Vec<String>) {
    if let Some(advice) = knowledge::lookup(message) {
        return (
            format!(
                "{}\n\nMeanwhile, here is some general guidance.\n\n{}",
                fallback.narrative,
                advice.render()
            ),
            vec![
                "When should I seek urgent care?".to_string(),
                "Which medication can I take?".to_string(),
                "Book an appointment with a specialist".to_string(),
            ],
        );
    }

    match intents::classify(message) {
        Some(intent) => {
            let reply = intent.reply();
            (
                format!("(Backup mode) {}", reply.text),
                reply.suggestions.iter().map(|s| s.to_string()).collect(),
            )
        }
        None => (fallback.narrative.clone(), fallback.suggestions.clone()),
    }
}

/// Enforce the result invariants: confidence in [0, 1], non-empty narrative.
fn finalize(mut result: SynthesizedResult) -> SynthesizedResult {
    result.confidence = if result.confidence.is_finite() {
        result.confidence.clamp(0.0, 1.0)
    } else {
        FALLBACK_CONFIDENCE
    };
    if result.narrative.trim().is_empty() {
        result.narrative = format!("No narrative available for this {} request.", result.operation());
    }
    result
}

fn parse_priority(raw: &str) -> Option<Priority> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "LOW" => Some(Priority::Low),
        "NORMAL" => Some(Priority::Normal),
        "HIGH" => Some(Priority::High),
        "URGENT" => Some(Priority::Urgent),
        _ => None,
    }
}

fn alerts(risk: &RiskAssessment) -> String {
    if risk.warnings().is_empty() {
        "none".to_string()
    } else {
        risk.warnings().join(", ")
    }
}

fn local_triage_explanation(risk: &RiskAssessment) -> String {
    format!(
        "Assessment based on vital signs. Alerts: {}. Local score {}/100, priority {}.",
        alerts(risk),
        risk.score(),
        risk.priority()
    )
}

fn local_support_note(risk: &RiskAssessment) -> String {
    format!(
        "[Local support]: anomaly index {:.2} against the reference population. Vital sign alerts: {}.",
        risk.anomaly_index().unwrap_or(0.0),
        alerts(risk)
    )
}

fn triage_suggestions(priority: Priority) -> Vec<String> {
    let suggestions: &[&str] = match priority {
        Priority::Urgent => &[
            "Immediate physician evaluation",
            "Continuous vital sign monitoring",
        ],
        Priority::High => &["Physician evaluation within 15 minutes", "Repeat vital signs"],
        Priority::Normal => &["Physician evaluation within 60 minutes"],
        Priority::Low => &["Standard consultation queue"],
    };
    suggestions.iter().map(|s| s.to_string()).collect()
}

fn triage_detail(score: u8, priority: Priority, risk: &RiskAssessment) -> ResultDetail {
    ResultDetail::Triage {
        score,
        priority: priority.as_str().to_string(),
        warnings: risk.warnings().to_vec(),
        anomaly_index: risk.anomaly_index(),
    }
}

fn local_demand(series: Option<&SeriesSummary>) -> u64 {
    series
        .map(|s| s.mean.round().max(0.0) as u64)
        .unwrap_or(DEFAULT_DEMAND)
}

fn local_projection(series: Option<&SeriesSummary>) -> Vec<MonthlyProjection> {
    let predicted = series
        .map(|s| s.last + s.mean_delta)
        .unwrap_or(DEFAULT_REVENUE_BASELINE);
    vec![MonthlyProjection {
        month: "Next period".to_string(),
        predicted,
        confidence: FALLBACK_CONFIDENCE,
    }]
}

fn local_growth(series: Option<&SeriesSummary>) -> f64 {
    series.and_then(SeriesSummary::growth_percent).unwrap_or(0.0)
}

fn with_strategic_heading(insight: String) -> String {
    if insight.to_lowercase().contains("strategic") {
        insight
    } else {
        format!("{}{}", STRATEGIC_HEADING, insight)
    }
}

fn emergency_summary(request: &ClinicalRequest) -> String {
    let keep = request.max_length().saturating_sub(SUMMARY_TRUNCATION_MARGIN);
    let truncated: String = request.text().chars().take(keep).collect();
    format!("{}{}...", EMERGENCY_SUMMARY_HEADING, truncated)
}

fn summary_detail(
    request: &ClinicalRequest,
    summary: &str,
    entities: Option<Vec<String>>,
) -> ResultDetail {
    ResultDetail::Summarize {
        clinical_entities: entities.unwrap_or_default(),
        original_length: request.text().chars().count(),
        summary_length: summary.chars().count(),
    }
}
