//! Core types for clinical decision requests and results.
//!
//! Requests are immutable once constructed: fields are private and only
//! exposed through accessors. Results are plain data owned by the caller.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::stats::SeriesSummary;
use crate::RequestError;

/// Default summary length when the caller does not provide one.
pub const DEFAULT_SUMMARY_MAX_LENGTH: usize = 200;

lazy_static! {
    /// Blood pressure in "systolic/diastolic" form, anchored at the start.
    static ref BLOOD_PRESSURE_PATTERN: Regex = Regex::new(r"^\s*(\d+)\s*/\s*(\d+)").unwrap();
}

/// The operation a request asks the engine to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Emergency triage over symptoms and vital signs
    Triage,
    /// Conversational medical assistant
    Chat,
    /// Pharmacy demand forecast over a consumption series
    DemandForecast,
    /// Financial growth analysis over a revenue series
    GrowthAnalysis,
    /// SOAP-lite clinical note summary
    Summarize,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Operation; 5] = [
        Operation::Triage,
        Operation::Chat,
        Operation::DemandForecast,
        Operation::GrowthAnalysis,
        Operation::Summarize,
    ];

    /// Returns the wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Triage => "triage",
            Operation::Chat => "chat",
            Operation::DemandForecast => "demand-forecast",
            Operation::GrowthAnalysis => "growth-analysis",
            Operation::Summarize => "summarize",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vital signs with every field optional.
///
/// On the wire, blood pressure travels as a `"sys/dia"` string and numeric
/// fields may arrive as numbers or numeric strings. Malformed values are
/// dropped at parse time so the scoring rule they feed is skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawVitals", into = "RawVitals")]
pub struct Vitals {
    /// Body temperature in °C
    pub temperature: Option<f64>,
    /// Systolic blood pressure in mmHg
    pub systolic_bp: Option<u32>,
    /// Diastolic blood pressure in mmHg
    pub diastolic_bp: Option<u32>,
    /// Peripheral oxygen saturation in %
    pub oxygen_saturation: Option<f64>,
    /// Heart rate in beats per minute
    pub heart_rate: Option<u32>,
}

impl Vitals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    pub fn with_blood_pressure(mut self, systolic: u32, diastolic: u32) -> Self {
        self.systolic_bp = Some(systolic);
        self.diastolic_bp = Some(diastolic);
        self
    }

    pub fn with_oxygen_saturation(mut self, percent: f64) -> Self {
        self.oxygen_saturation = Some(percent);
        self
    }

    pub fn with_heart_rate(mut self, bpm: u32) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    /// True when no vital sign is present.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.systolic_bp.is_none()
            && self.diastolic_bp.is_none()
            && self.oxygen_saturation.is_none()
            && self.heart_rate.is_none()
    }

    /// Parse a `"sys/dia"` blood pressure reading.
    pub fn parse_blood_pressure(raw: &str) -> Option<(u32, u32)> {
        let captures = BLOOD_PRESSURE_PATTERN.captures(raw)?;
        let systolic = captures.get(1)?.as_str().parse().ok()?;
        let diastolic = captures.get(2)?.as_str().parse().ok()?;
        Some((systolic, diastolic))
    }
}

/// Wire representation of [`Vitals`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<JsonValue>,
    #[serde(default, alias = "blood_pressure", skip_serializing_if = "Option::is_none")]
    blood_pressure: Option<JsonValue>,
    #[serde(default, alias = "oxygen_saturation", skip_serializing_if = "Option::is_none")]
    oxygen_saturation: Option<JsonValue>,
    #[serde(default, alias = "heart_rate", skip_serializing_if = "Option::is_none")]
    heart_rate: Option<JsonValue>,
}

impl From<RawVitals> for Vitals {
    fn from(raw: RawVitals) -> Self {
        let (systolic_bp, diastolic_bp) = match raw.blood_pressure {
            Some(JsonValue::String(ref reading)) => match Vitals::parse_blood_pressure(reading) {
                Some((sys, dia)) => (Some(sys), Some(dia)),
                None => {
                    tracing::warn!(field = "bloodPressure", "Ignoring malformed vital sign");
                    (None, None)
                }
            },
            Some(JsonValue::Null) | None => (None, None),
            Some(_) => {
                tracing::warn!(field = "bloodPressure", "Ignoring malformed vital sign");
                (None, None)
            }
        };

        Self {
            temperature: lenient_number("temperature", raw.temperature),
            systolic_bp,
            diastolic_bp,
            oxygen_saturation: lenient_number("oxygenSaturation", raw.oxygen_saturation),
            heart_rate: lenient_number("heartRate", raw.heart_rate)
                .filter(|bpm| *bpm >= 0.0 && *bpm <= u32::MAX as f64)
                .map(|bpm| bpm.round() as u32),
        }
    }
}

impl From<Vitals> for RawVitals {
    fn from(vitals: Vitals) -> Self {
        let blood_pressure = match (vitals.systolic_bp, vitals.diastolic_bp) {
            (Some(sys), Some(dia)) => Some(JsonValue::String(format!("{}/{}", sys, dia))),
            _ => None,
        };

        Self {
            temperature: vitals.temperature.map(JsonValue::from),
            blood_pressure,
            oxygen_saturation: vitals.oxygen_saturation.map(JsonValue::from),
            heart_rate: vitals.heart_rate.map(JsonValue::from),
        }
    }
}

/// Accept a number or a numeric string; anything else is logged and dropped.
fn lenient_number(field: &'static str, value: Option<JsonValue>) -> Option<f64> {
    let value = value?;
    let parsed = match &value {
        JsonValue::Null => return None,
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Some(v),
        _ => {
            tracing::warn!(field, value = %value, "Ignoring malformed vital sign");
            None
        }
    }
}

/// A validated clinical request.
///
/// Construct with one of the per-operation constructors or [`ClinicalRequest::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalRequest {
    operation: Operation,

    /// Symptoms, chat message or clinical note, depending on the operation
    #[serde(default, alias = "symptoms", alias = "message")]
    text: String,

    #[serde(default, alias = "vitalSigns", alias = "vital_signs", skip_serializing_if = "Option::is_none")]
    vitals: Option<Vitals>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    age: Option<u32>,

    #[serde(
        default,
        alias = "historicalData",
        alias = "historical_data",
        skip_serializing_if = "Option::is_none"
    )]
    history: Option<Vec<f64>>,

    /// Medication identifier for demand forecasts
    #[serde(
        default,
        alias = "medicationId",
        alias = "medication_id",
        skip_serializing_if = "Option::is_none"
    )]
    subject_id: Option<String>,

    #[serde(default, alias = "max_length", skip_serializing_if = "Option::is_none")]
    max_length: Option<usize>,

    /// Additional conversational context for chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl ClinicalRequest {
    fn base(operation: Operation, text: impl Into<String>) -> Self {
        Self {
            operation,
            text: text.into(),
            vitals: None,
            age: None,
            history: None,
            subject_id: None,
            max_length: None,
            context: None,
        }
    }

    /// Triage request over symptoms, age and vital signs.
    pub fn triage(symptoms: impl Into<String>, age: Option<u32>, vitals: Option<Vitals>) -> Self {
        Self {
            age,
            vitals,
            ..Self::base(Operation::Triage, symptoms)
        }
    }

    /// Chat request for a single user message.
    pub fn chat(message: impl Into<String>) -> Self {
        Self::base(Operation::Chat, message)
    }

    /// Chat request with additional conversational context.
    pub fn chat_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            ..Self::base(Operation::Chat, message)
        }
    }

    /// Demand forecast for a medication over its consumption history.
    pub fn demand_forecast(medication_id: impl Into<String>, history: Vec<f64>) -> Self {
        Self {
            subject_id: Some(medication_id.into()),
            history: Some(history),
            ..Self::base(Operation::DemandForecast, "")
        }
    }

    /// Growth analysis over a revenue history, with optional free-text context.
    pub fn growth_analysis(history: Vec<f64>, notes: impl Into<String>) -> Self {
        Self {
            history: Some(history),
            ..Self::base(Operation::GrowthAnalysis, notes)
        }
    }

    /// Summary of a clinical note.
    pub fn summarize(note: impl Into<String>, max_length: Option<usize>) -> Self {
        Self {
            max_length,
            ..Self::base(Operation::Summarize, note)
        }
    }

    /// Parse and validate a request from JSON.
    pub fn from_json(json: &str) -> Result<Self, RequestError> {
        let request: Self = serde_json::from_str(json)?;
        request.validate()?;
        Ok(request)
    }

    /// Check the minimal invariants each operation relies on.
    pub fn validate(&self) -> Result<(), RequestError> {
        let needs_text = matches!(
            self.operation,
            Operation::Triage | Operation::Chat | Operation::Summarize
        );
        if needs_text && self.text.trim().is_empty() {
            return Err(RequestError::MissingField {
                operation: self.operation,
                field: "text",
            });
        }
        if self.max_length == Some(0) {
            return Err(RequestError::InvalidField {
                field: "maxLength",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn vitals(&self) -> Option<&Vitals> {
        self.vitals.as_ref()
    }

    pub fn age(&self) -> Option<u32> {
        self.age
    }

    pub fn history(&self) -> Option<&[f64]> {
        self.history.as_deref()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    /// Requested summary length, defaulting to [`DEFAULT_SUMMARY_MAX_LENGTH`].
    pub fn max_length(&self) -> usize {
        self.max_length.unwrap_or(DEFAULT_SUMMARY_MAX_LENGTH)
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

/// Priority band derived from a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Map a score to its band: >= 90 urgent, >= 70 high, >= 40 normal.
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Priority::Urgent,
            70..=89 => Priority::High,
            40..=69 => Priority::Normal,
            _ => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic risk assessment produced once per triage request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    score: u8,
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anomaly_index: Option<f64>,
}

impl RiskAssessment {
    /// Build an assessment. The score is capped at 100 and duplicate
    /// warnings are dropped, keeping the first occurrence.
    pub fn new(score: u8, warnings: Vec<String>, anomaly_index: Option<f64>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(warnings.len());
        for warning in warnings {
            if !unique.contains(&warning) {
                unique.push(warning);
            }
        }

        Self {
            score: score.min(100),
            warnings: unique,
            anomaly_index,
        }
    }

    /// Severity score in [0, 100].
    pub fn score(&self) -> u8 {
        self.score
    }

    /// Warning labels in detection order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn anomaly_index(&self) -> Option<f64> {
        self.anomaly_index
    }

    pub fn priority(&self) -> Priority {
        Priority::from_score(self.score)
    }
}

/// Everything the deterministic engine computed for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocalEvidence {
    /// Triage risk assessment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,

    /// Descriptive statistics of the request's numeric history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesSummary>,
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A remote backend answered and its payload was merged
    Remote,
    /// Every backend failed; the local engine produced the answer
    LocalFallback,
    /// The chat safety filter short-circuited the pipeline
    SecurityFilter,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Remote => "remote",
            Source::LocalFallback => "local_fallback",
            Source::SecurityFilter => "security_filter",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One month of a growth projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyProjection {
    pub month: String,
    pub predicted: f64,
    pub confidence: f64,
}

/// Operation-specific part of a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum ResultDetail {
    Triage {
        score: u8,
        priority: String,
        warnings: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        anomaly_index: Option<f64>,
    },
    Chat,
    DemandForecast {
        #[serde(skip_serializing_if = "Option::is_none")]
        subject_id: Option<String>,
        predicted_demand: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        statistics: Option<SeriesSummary>,
    },
    GrowthAnalysis {
        predictions: Vec<MonthlyProjection>,
        projected_annual_growth: f64,
        accuracy_score: f64,
    },
    Summarize {
        clinical_entities: Vec<String>,
        original_length: usize,
        summary_length: usize,
    },
}

impl ResultDetail {
    pub fn operation(&self) -> Operation {
        match self {
            ResultDetail::Triage { .. } => Operation::Triage,
            ResultDetail::Chat => Operation::Chat,
            ResultDetail::DemandForecast { .. } => Operation::DemandForecast,
            ResultDetail::GrowthAnalysis { .. } => Operation::GrowthAnalysis,
            ResultDetail::Summarize { .. } => Operation::Summarize,
        }
    }
}

/// The single decision object returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedResult {
    /// Human-readable narrative (never empty)
    pub narrative: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Follow-up suggestions
    pub suggestions: Vec<String>,

    /// Provenance of the result
    pub source: Source,

    /// Model identifier that produced the remote part, or a local tag
    pub model: String,

    #[serde(flatten)]
    pub detail: ResultDetail,
}

impl SynthesizedResult {
    pub fn operation(&self) -> Operation {
        self.detail.operation()
    }

    /// True when the answer did not come from a remote backend.
    pub fn is_degraded(&self) -> bool {
        self.source == Source::LocalFallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vitals_from_wire_format() {
        let vitals: Vitals = serde_json::from_str(
            r#"{"temperature": 38.9, "bloodPressure": "145/92", "oxygenSaturation": "94", "heartRate": 101}"#,
        )
        .unwrap();

        assert_eq!(vitals.temperature, Some(38.9));
        assert_eq!(vitals.systolic_bp, Some(145));
        assert_eq!(vitals.diastolic_bp, Some(92));
        assert_eq!(vitals.oxygen_saturation, Some(94.0));
        assert_eq!(vitals.heart_rate, Some(101));
    }

    #[test]
    fn test_malformed_vitals_are_dropped() {
        let vitals: Vitals = serde_json::from_str(
            r#"{"temperature": "hot", "bloodPressure": "high", "oxygenSaturation": [95]}"#,
        )
        .unwrap();

        assert!(vitals.is_empty());
    }

    #[test]
    fn test_vitals_serialize_blood_pressure_as_string() {
        let vitals = Vitals::new().with_blood_pressure(120, 80);
        let json = serde_json::to_value(&vitals).unwrap();
        assert_eq!(json["bloodPressure"], "120/80");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_parse_blood_pressure() {
        assert_eq!(Vitals::parse_blood_pressure("120/80"), Some((120, 80)));
        assert_eq!(Vitals::parse_blood_pressure(" 185 / 95 mmHg"), Some((185, 95)));
        assert_eq!(Vitals::parse_blood_pressure("mmHg 120/80"), None);
        assert_eq!(Vitals::parse_blood_pressure("120"), None);
    }

    #[test]
    fn test_request_from_json_with_aliases() {
        let request = ClinicalRequest::from_json(
            r#"{"operation": "triage", "symptoms": "chest pain", "age": 64,
                "vitalSigns": {"temperature": 37.1, "bloodPressure": "150/95"}}"#,
        )
        .unwrap();

        assert_eq!(request.operation(), Operation::Triage);
        assert_eq!(request.text(), "chest pain");
        assert_eq!(request.age(), Some(64));
        assert_eq!(request.vitals().unwrap().systolic_bp, Some(150));
    }

    #[test]
    fn test_request_validation() {
        let result = ClinicalRequest::from_json(r#"{"operation": "chat", "message": "   "}"#);
        assert!(matches!(
            result,
            Err(RequestError::MissingField { field: "text", .. })
        ));

        let result = ClinicalRequest::from_json(r#"{"operation": "bogus"}"#);
        assert!(matches!(result, Err(RequestError::InvalidJson(_))));

        let demand = ClinicalRequest::from_json(
            r#"{"operation": "demand-forecast", "medicationId": "AMOX-500", "historicalData": [10, 20, 30]}"#,
        )
        .unwrap();
        assert_eq!(demand.history(), Some(&[10.0, 20.0, 30.0][..]));
        assert_eq!(demand.subject_id(), Some("AMOX-500"));
    }

    #[test]
    fn test_request_accepts_snake_case_fields() {
        let demand = ClinicalRequest::from_json(
            r#"{"operation": "demand-forecast", "medication_id": "IBU-400", "historical_data": [10, 20, 30]}"#,
        )
        .unwrap();
        assert_eq!(demand.history(), Some(&[10.0, 20.0, 30.0][..]));
        assert_eq!(demand.subject_id(), Some("IBU-400"));

        let summary = ClinicalRequest::from_json(
            r#"{"operation": "summarize", "text": "note", "max_length": 80}"#,
        )
        .unwrap();
        assert_eq!(summary.max_length(), 80);

        let triage = ClinicalRequest::from_json(
            r#"{"operation": "triage", "symptoms": "fever", "age": 5,
                "vital_signs": {"temperature": 40.2, "oxygen_saturation": 95, "blood_pressure": "120/80"}}"#,
        )
        .unwrap();
        let vitals = triage.vitals().unwrap();
        assert_eq!(vitals.temperature, Some(40.2));
        assert_eq!(vitals.oxygen_saturation, Some(95.0));
        assert_eq!(vitals.systolic_bp, Some(120));
    }

    #[test]
    fn test_summary_max_length_default() {
        let request = ClinicalRequest::summarize("note", None);
        assert_eq!(request.max_length(), DEFAULT_SUMMARY_MAX_LENGTH);
    }

    #[test]
    fn test_priority_bands() {
        assert_eq!(Priority::from_score(100), Priority::Urgent);
        assert_eq!(Priority::from_score(90), Priority::Urgent);
        assert_eq!(Priority::from_score(80), Priority::High);
        assert_eq!(Priority::from_score(50), Priority::Normal);
        assert_eq!(Priority::from_score(20), Priority::Low);
    }

    #[test]
    fn test_risk_assessment_dedups_and_caps() {
        let risk = RiskAssessment::new(
            150,
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
            None,
        );
        assert_eq!(risk.score(), 100);
        assert_eq!(risk.warnings(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = SynthesizedResult {
            narrative: "ok".to_string(),
            confidence: 0.5,
            suggestions: vec![],
            source: Source::LocalFallback,
            model: "local-fallback".to_string(),
            detail: ResultDetail::Chat,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source"], "local_fallback");
        assert_eq!(json["operation"], "chat");
        assert!(result.is_degraded());
    }
}
