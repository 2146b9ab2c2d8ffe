//! Lexical safety filter for conversational requests.
//!
//! A message that mentions a high-severity situation never reaches a remote
//! model: the caller gets the fixed emergency protocol instead.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Emergency protocol returned when the filter fires.
pub const EMERGENCY_PROTOCOL_MESSAGE: &str = "### Emergency protocol\n\n\
If you or someone near you is experiencing a medical emergency, call your local emergency \
number (911 / 112) now or go to the nearest emergency department.\n\n\
- Do not wait for an online answer.\n\
- Stay with the person and keep the line open.\n\
- If there is a risk of self-harm, contact a crisis line immediately.";

/// Follow-up actions attached to the emergency protocol.
pub const EMERGENCY_SUGGESTIONS: [&str; 3] = [
    "Call emergency services",
    "Locate the nearest emergency department",
    "Contact a crisis line",
];

/// Category of a high-severity trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCategory {
    Emergency,
    SelfHarm,
    CardiacArrest,
    RespiratoryDistress,
    LossOfConsciousness,
}

lazy_static! {
    static ref TRIGGERS: Vec<(TriggerCategory, Regex)> = vec![
        (
            TriggerCategory::Emergency,
            Regex::new(r"(?i)\b(emergencias?|emergenc(?:y|ies))\b").unwrap(),
        ),
        (
            TriggerCategory::SelfHarm,
            Regex::new(r"(?i)\b(suicid\w*|quitarme la vida|kill myself|end my life|self[- ]harm)\b")
                .unwrap(),
        ),
        (
            TriggerCategory::CardiacArrest,
            Regex::new(r"(?i)\b(paro card[ií]aco|cardiac arrest|heart attack|infarto)\b").unwrap(),
        ),
        (
            TriggerCategory::RespiratoryDistress,
            Regex::new(
                r"(?i)\b(no puedo respirar|can(?:[’'‘`]?t| ?not) breathe|unable to breathe|me estoy ahogando)\b"
            )
            .unwrap(),
        ),
        (
            TriggerCategory::LossOfConsciousness,
            Regex::new(r"(?i)\b(inconsciente|unconscious)\b").unwrap(),
        ),
    ];
}

/// What the filter matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyVerdict {
    /// Categories that fired, in declaration order
    pub categories: Vec<TriggerCategory>,
    /// The literal text each category matched
    pub matched_terms: Vec<String>,
}

/// Short-circuit filter placed in front of the chat pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyFilter;

impl SafetyFilter {
    pub fn new() -> Self {
        Self
    }

    /// Scan a message. Returns `Some` when the emergency protocol applies.
    pub fn check(&self, message: &str) -> Option<SafetyVerdict> {
        let mut categories = Vec::new();
        let mut matched_terms = Vec::new();

        for (category, pattern) in TRIGGERS.iter() {
            if let Some(m) = pattern.find(message) {
                categories.push(*category);
                matched_terms.push(m.as_str().to_string());
            }
        }

        if categories.is_empty() {
            None
        } else {
            tracing::warn!(categories = ?categories, "Safety filter triggered");
            Some(SafetyVerdict {
                categories,
                matched_terms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spanish_breathing_trigger() {
        let verdict = SafetyFilter::new().check("Ayuda, no puedo respirar bien").unwrap();
        assert_eq!(verdict.categories, vec![TriggerCategory::RespiratoryDistress]);
        assert_eq!(verdict.matched_terms, vec!["no puedo respirar".to_string()]);
    }

    #[test]
    fn test_case_insensitive_and_accents() {
        let filter = SafetyFilter::new();
        assert!(filter.check("Creo que es un PARO CARDÍACO").is_some());
        assert!(filter.check("I think he's having a Heart Attack").is_some());
        assert!(filter.check("I can't breathe").is_some());
        assert!(filter.check("my father is unconscious").is_some());
    }

    #[test]
    fn test_typographic_apostrophes() {
        let filter = SafetyFilter::new();
        for message in ["I can\u{2019}t breathe", "i can\u{2018}t breathe", "I cant breathe", "I can not breathe"] {
            let verdict = filter.check(message).unwrap();
            assert_eq!(verdict.categories, vec![TriggerCategory::RespiratoryDistress], "{}", message);
        }
    }

    #[test]
    fn test_plural_emergency_terms() {
        let filter = SafetyFilter::new();
        assert_eq!(
            filter.check("llamen a emergencias").unwrap().categories,
            vec![TriggerCategory::Emergency]
        );
        assert!(filter.check("how do I reach emergencies after midnight?").is_some());
        assert!(filter.check("Emergencia en casa").is_some());
    }

    #[test]
    fn test_self_harm_trigger() {
        let verdict = SafetyFilter::new()
            .check("I have been thinking about suicide")
            .unwrap();
        assert_eq!(verdict.categories, vec![TriggerCategory::SelfHarm]);
    }

    #[test]
    fn test_multiple_categories() {
        let verdict = SafetyFilter::new()
            .check("Emergency! She is unconscious")
            .unwrap();
        assert_eq!(
            verdict.categories,
            vec![TriggerCategory::Emergency, TriggerCategory::LossOfConsciousness]
        );
    }

    #[test]
    fn test_benign_messages_pass() {
        let filter = SafetyFilter::new();
        assert!(filter.check("Hola, tengo un poco de tos").is_none());
        assert!(filter.check("What are the side effects of ibuprofen?").is_none());
        assert!(filter.check("breathing exercises for anxiety").is_none());
    }
}
