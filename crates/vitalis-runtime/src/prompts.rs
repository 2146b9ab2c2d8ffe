//! Personas and task prompts for each operation.
//!
//! Every request is sent as two messages:
//! 1. System: the shared base persona plus the operation persona
//! 2. User: the task, the local evidence and the required JSON shape
//!
//! Local evidence is embedded so the model can corroborate it; the model is
//! told not to downgrade a critical local signal without justification.

use serde_json::Value as JsonValue;
use std::fmt::Write as _;

use vitalis_core::{ClinicalRequest, LocalEvidence, Operation};

use crate::providers::ChatMessage;

/// Base persona shared across all operations.
pub const BASE_PERSONA: &str = r#"
You are Vitalis, the clinical decision support assistant of a hospital platform.

## Ground Rules
1. You support clinicians and patients; you never replace a medical professional
2. Prefer conservative recommendations when information is incomplete
3. Treat the local evidence you are given as measured fact
4. Never invent vital signs, history or diagnoses that are not in the input
5. Answer with a single JSON object and nothing else
"#;

/// Emergency triage persona.
pub const TRIAGE_PERSONA: &str = r#"
## Role: Emergency Triage Specialist

You classify patients arriving at the emergency department using the
Manchester triage scale. You weigh symptoms against measured vital signs
and the patient's age.

A local rule engine has already scored the vital signs. Its critical alerts
are reliable: do not assign a lower priority than a critical local alert
implies unless you state an explicit clinical justification in the notes.
"#;

/// Conversational assistant persona.
pub const CHAT_PERSONA: &str = r#"
## Role: Virtual Medical Assistant

You answer patient questions with empathy and precision, in the language
the patient used. You give general guidance only, recommend an in-person
consultation when symptoms warrant it, and keep answers short and
structured with markdown.
"#;

/// Pharmacy demand forecasting persona.
pub const DEMAND_PERSONA: &str = r#"
## Role: Pharmaceutical Supply Analyst

You forecast next-period demand for a medication from its consumption
history. Account for trend, variability and peaks. Your recommendation must
be actionable for the pharmacy's purchasing staff.
"#;

/// Financial growth analysis persona.
pub const GROWTH_PERSONA: &str = r#"
## Role: Healthcare Financial Analyst

You project revenue for the coming months from historical figures and
write a strategic analysis for hospital management. Be explicit about
uncertainty and about the assumptions behind each projection.
"#;

/// Clinical documentation persona.
pub const SUMMARY_PERSONA: &str = r#"
## Role: Clinical Documentation Specialist

You condense clinical notes into a SOAP structure (Subjective, Objective,
Analysis, Plan) without losing clinically relevant facts. You extract the
clinical entities mentioned: conditions, medications, procedures and
measurements.
"#;

/// Operation persona, without the base.
pub fn get_persona(operation: Operation) -> &'static str {
    match operation {
        Operation::Triage => TRIAGE_PERSONA,
        Operation::Chat => CHAT_PERSONA,
        Operation::DemandForecast => DEMAND_PERSONA,
        Operation::GrowthAnalysis => GROWTH_PERSONA,
        Operation::Summarize => SUMMARY_PERSONA,
    }
}

/// JSON type a response field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    StringList,
    /// Array of `{month: string, predicted: number, confidence: number}`
    ProjectionList,
}

impl FieldKind {
    /// True when `value` is non-null and of this type.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.as_f64().is_some_and(f64::is_finite),
            FieldKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(JsonValue::is_string)),
            FieldKind::ProjectionList => value.as_array().is_some_and(|items| {
                items.iter().all(|item| {
                    item["month"].is_string()
                        && item["predicted"].as_f64().is_some_and(f64::is_finite)
                        && item["confidence"].as_f64().is_some_and(f64::is_finite)
                })
            }),
        }
    }

    fn template(&self) -> &'static str {
        match self {
            FieldKind::String => "\"string\"",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::StringList => "[\"string\", ...]",
            FieldKind::ProjectionList => {
                "[{\"month\": \"string\", \"predicted\": number, \"confidence\": number}, ...]"
            }
        }
    }
}

/// One field of the response contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub hint: &'static str,
}

const fn field(name: &'static str, kind: FieldKind, hint: &'static str) -> FieldSpec {
    FieldSpec { name, kind, hint }
}

const TRIAGE_FIELDS: &[FieldSpec] = &[
    field("score", FieldKind::Integer, "severity from 0 to 100"),
    field("priority", FieldKind::String, "LOW | NORMAL | HIGH | URGENT"),
    field("notes", FieldKind::String, "clinical reasoning"),
    field("confidence", FieldKind::Number, "0.0 to 1.0"),
    field("suggestions", FieldKind::StringList, "immediate actions"),
];

const CHAT_FIELDS: &[FieldSpec] = &[
    field("response", FieldKind::String, "markdown answer"),
    field("confidence", FieldKind::Number, "0.0 to 1.0"),
    field("suggestions", FieldKind::StringList, "follow-up questions"),
];

const DEMAND_FIELDS: &[FieldSpec] = &[
    field("predicted_demand", FieldKind::Integer, "units for the next period"),
    field("confidence", FieldKind::Number, "0.0 to 1.0"),
    field("recommendation", FieldKind::String, "purchasing advice"),
];

const GROWTH_FIELDS: &[FieldSpec] = &[
    field("predictions", FieldKind::ProjectionList, "next months"),
    field("insight", FieldKind::String, "strategic analysis in markdown"),
    field("projected_annual_growth", FieldKind::Number, "percent"),
    field("accuracy_score", FieldKind::Number, "0.0 to 1.0"),
];

const SUMMARY_FIELDS: &[FieldSpec] = &[
    field("summary", FieldKind::String, "SOAP summary in markdown"),
    field("clinical_entities", FieldKind::StringList, "entities mentioned"),
];

/// Field names and types the backend must answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSchema {
    fields: &'static [FieldSpec],
}

impl OutputSchema {
    pub fn for_operation(operation: Operation) -> Self {
        let fields = match operation {
            Operation::Triage => TRIAGE_FIELDS,
            Operation::Chat => CHAT_FIELDS,
            Operation::DemandForecast => DEMAND_FIELDS,
            Operation::GrowthAnalysis => GROWTH_FIELDS,
            Operation::Summarize => SUMMARY_FIELDS,
        };
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON-like template embedded in the task prompt.
    pub fn describe(&self) -> String {
        let body = self
            .fields
            .iter()
            .map(|f| format!("  \"{}\": {}  // {}", f.name, f.kind.template(), f.hint))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("{{\n{}\n}}", body)
    }
}

/// Everything sent to a backend for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub operation: Operation,
    pub persona: String,
    pub task: String,
    pub schema: OutputSchema,
}

impl ComposedPrompt {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.persona.clone()),
            ChatMessage::user(self.task.clone()),
        ]
    }
}

/// Builds prompts from a request and its local evidence. Pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer;

impl PromptComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, request: &ClinicalRequest, evidence: &LocalEvidence) -> ComposedPrompt {
        let operation = request.operation();
        let schema = OutputSchema::for_operation(operation);

        let mut task = match operation {
            Operation::Triage => triage_task(request, evidence),
            Operation::Chat => chat_task(request),
            Operation::DemandForecast => demand_task(request, evidence),
            Operation::GrowthAnalysis => growth_task(request, evidence),
            Operation::Summarize => summary_task(request),
        };

        let _ = write!(
            task,
            "\n\n## Required JSON format\nRespond with exactly these fields:\n{}",
            schema.describe()
        );

        ComposedPrompt {
            operation,
            persona: format!("{}\n{}", BASE_PERSONA.trim(), get_persona(operation)),
            task,
            schema,
        }
    }
}

fn triage_task(request: &ClinicalRequest, evidence: &LocalEvidence) -> String {
    let vitals = request
        .vitals()
        .and_then(|v| serde_json::to_string(v).ok())
        .unwrap_or_else(|| "not recorded".to_string());
    let age = request
        .age()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut task = format!(
        "## Patient\n- Age: {}\n- Symptoms: \"{}\"\n- Vital signs: {}\n",
        age,
        request.text(),
        vitals
    );

    if let Some(risk) = &evidence.risk {
        let alerts = if risk.warnings().is_empty() {
            "none".to_string()
        } else {
            risk.warnings().join(", ")
        };
        let _ = write!(
            task,
            "\n## Local rule engine\n- Score: {}/100 ({})\n- Alerts: {}\n",
            risk.score(),
            risk.priority(),
            alerts
        );
        if let Some(index) = risk.anomaly_index() {
            let _ = writeln!(task, "- Anomaly index vs reference population: {:.2}", index);
        }
        task.push_str(
            "\nCorroborate the local alerts. A critical local alert may only be \
             downgraded with an explicit clinical justification in the notes.",
        );
    }

    task
}

fn chat_task(request: &ClinicalRequest) -> String {
    let mut task = String::new();
    if let Some(context) = request.context() {
        let _ = write!(task, "## Conversation context\n{}\n\n", context);
    }
    let _ = write!(
        task,
        "## Patient message\n\"{}\"\n\nAnswer with general guidance and say when an in-person \
         consultation is needed.",
        request.text()
    );
    task
}

fn history_block(request: &ClinicalRequest, evidence: &LocalEvidence) -> String {
    let history = request
        .history()
        .map(|h| format!("{:?}", h))
        .unwrap_or_else(|| "[]".to_string());
    let statistics = evidence
        .series
        .as_ref()
        .map(|s| s.describe())
        .unwrap_or_else(|| "no usable history".to_string());

    format!("- History: {}\n- Statistics: {}\n", history, statistics)
}

fn demand_task(request: &ClinicalRequest, evidence: &LocalEvidence) -> String {
    format!(
        "## Medication\n- Identifier: {}\n{}\nForecast the demand for the next period.",
        request.subject_id().unwrap_or("unspecified"),
        history_block(request, evidence)
    )
}

fn growth_task(request: &ClinicalRequest, evidence: &LocalEvidence) -> String {
    let mut task = format!("## Revenue series\n{}", history_block(request, evidence));
    if !request.text().trim().is_empty() {
        let _ = writeln!(task, "- Analyst notes: \"{}\"", request.text());
    }
    task.push_str(
        "\nProject the next 3 months and estimate the annual growth. The insight must \
         include a strategic analysis section.",
    );
    task
}

fn summary_task(request: &ClinicalRequest) -> String {
    format!(
        "## Clinical note\n\"{}\"\n\nSummarize in SOAP format in at most {} characters and \
         list the clinical entities.",
        request.text(),
        request.max_length()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalis_core::{DeterministicRiskScorer, Vitals};

    fn compose(request: &ClinicalRequest) -> ComposedPrompt {
        let evidence = DeterministicRiskScorer::new().assess(request);
        PromptComposer::new().compose(request, &evidence)
    }

    #[test]
    fn test_every_persona_has_role_and_base() {
        for operation in Operation::ALL {
            assert!(get_persona(operation).contains("## Role:"));
        }
        assert!(BASE_PERSONA.contains("single JSON object"));
    }

    #[test]
    fn test_triage_prompt_embeds_local_evidence() {
        let request = ClinicalRequest::triage(
            "fever and confusion",
            Some(5),
            Some(Vitals::new().with_temperature(40.2)),
        );
        let prompt = compose(&request);

        assert!(prompt.persona.starts_with("You are Vitalis"));
        assert!(prompt.persona.contains("Emergency Triage Specialist"));
        assert!(prompt.task.contains("Score: 90/100 (URGENT)"));
        assert!(prompt.task.contains("critical temperature"));
        assert!(prompt.task.contains("Anomaly index"));
        assert!(prompt.task.contains("explicit clinical justification"));
        assert!(prompt.task.contains("\"priority\""));
    }

    #[test]
    fn test_demand_prompt_embeds_statistics() {
        let request = ClinicalRequest::demand_forecast("AMOX-500", vec![10.0, 20.0, 30.0]);
        let prompt = compose(&request);

        assert!(prompt.task.contains("AMOX-500"));
        assert!(prompt.task.contains("mean: 20.00"));
        assert!(prompt.task.contains("\"predicted_demand\": integer"));
    }

    #[test]
    fn test_chat_prompt_includes_context() {
        let request = ClinicalRequest::chat_with_context("Is it serious?", "Patient had a cough");
        let prompt = compose(&request);
        assert!(prompt.task.contains("Patient had a cough"));
        assert_eq!(prompt.messages().len(), 2);
        assert_eq!(prompt.messages()[1].role, crate::providers::Role::User);
    }

    #[test]
    fn test_summary_prompt_mentions_length() {
        let request = ClinicalRequest::summarize("Patient with cough for 3 days.", Some(120));
        assert!(compose(&request).task.contains("at most 120 characters"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let request = ClinicalRequest::growth_analysis(vec![100.0, 110.0, 125.0], "Q3 push");
        assert_eq!(compose(&request), compose(&request));
    }

    #[test]
    fn test_schema_fields_per_operation() {
        let triage = OutputSchema::for_operation(Operation::Triage);
        let names: Vec<&str> = triage.fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["score", "priority", "notes", "confidence", "suggestions"]);

        let summary = OutputSchema::for_operation(Operation::Summarize);
        assert_eq!(summary.field("clinical_entities").unwrap().kind, FieldKind::StringList);
        assert!(summary.field("confidence").is_none());
    }

    #[test]
    fn test_field_kind_accepts() {
        use serde_json::json;

        assert!(FieldKind::Integer.accepts(&json!(85)));
        assert!(!FieldKind::Integer.accepts(&json!(85.5)));
        assert!(!FieldKind::Integer.accepts(&json!("85")));
        assert!(FieldKind::Number.accepts(&json!(0.7)));
        assert!(!FieldKind::Number.accepts(&JsonValue::Null));
        assert!(FieldKind::StringList.accepts(&json!(["a", "b"])));
        assert!(!FieldKind::StringList.accepts(&json!(["a", 1])));
        assert!(FieldKind::ProjectionList.accepts(&json!([
            {"month": "Jan", "predicted": 5100.0, "confidence": 0.8}
        ])));
        assert!(!FieldKind::ProjectionList.accepts(&json!([{"month": "Jan"}])));
    }
}
