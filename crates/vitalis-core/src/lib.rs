//! # vitalis-core
//!
//! Deterministic half of the Vitalis clinical decision engine.
//!
//! This crate answers, without any network access:
//! - How severe do these vital signs look?
//! - Does this message require the emergency protocol?
//! - What do the historical numbers say, descriptively?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No LLM calls**: Everything here is rule-based
//! 3. **Bounded**: Scores stay in [0, 100]; malformed inputs degrade a rule, never the pass
//!
//! ## Example
//!
//! ```rust
//! use vitalis_core::{ClinicalRequest, DeterministicRiskScorer, Priority, Vitals};
//!
//! let vitals = Vitals::new().with_temperature(40.2).with_oxygen_saturation(95.0);
//! let request = ClinicalRequest::triage("high fever", Some(5), Some(vitals));
//!
//! let evidence = DeterministicRiskScorer::new().assess(&request);
//! let risk = evidence.risk.expect("triage always yields a risk assessment");
//! assert_eq!(risk.score(), 90);
//! assert_eq!(risk.priority(), Priority::Urgent);
//! ```

pub mod intents;
pub mod knowledge;
pub mod safety;
pub mod scorer;
pub mod stats;
pub mod types;

pub use intents::{ChatIntent, IntentReply};
pub use knowledge::ConditionAdvice;
pub use safety::{SafetyFilter, SafetyVerdict, TriggerCategory};
pub use scorer::{DeterministicRiskScorer, FeatureReference, ReferencePopulation};
pub use stats::SeriesSummary;
pub use types::{
    ClinicalRequest, LocalEvidence, MonthlyProjection, Operation, Priority, ResultDetail,
    RiskAssessment, Source, SynthesizedResult, Vitals,
};

use thiserror::Error;

/// Errors raised while building a request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Invalid request JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Operation '{operation}' requires a non-empty '{field}'")]
    MissingField {
        operation: Operation,
        field: &'static str,
    },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}
