//! Small built-in knowledge base for common complaints.
//!
//! Only consulted when every remote backend is down, to give the chat
//! fallback something more useful than a maintenance note.

use lazy_static::lazy_static;
use regex::Regex;

/// Guidance for one common condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionAdvice {
    pub condition: &'static str,
    /// Whole words or phrases that identify the condition in a message
    pub aliases: &'static [&'static str],
    pub causes: &'static [&'static str],
    pub recommendations: &'static [&'static str],
    pub when_urgent: &'static str,
}

pub const CONDITIONS: &[ConditionAdvice] = &[
    ConditionAdvice {
        condition: "Chest pain",
        aliases: &["chest pain", "dolor de pecho"],
        causes: &["Muscular strain", "Anxiety", "Cardiac problems", "Reflux"],
        recommendations: &["Rest", "Immediate medical evaluation", "Monitor symptoms"],
        when_urgent: "Always: chest pain requires urgent medical evaluation",
    },
    ConditionAdvice {
        condition: "Fever",
        aliases: &["fever", "fiebre"],
        causes: &["Viral infection", "Bacterial infection", "Inflammation"],
        recommendations: &["Plenty of fluids", "Antipyretics above 38.5 °C", "Rest"],
        when_urgent: "If the fever exceeds 39.5 °C or lasts more than 3 days",
    },
    ConditionAdvice {
        condition: "Headache",
        aliases: &["headache", "dolor de cabeza"],
        causes: &["Muscle tension", "Migraine", "Dehydration", "Stress"],
        recommendations: &["Rest in a dark room", "Hydration", "Over-the-counter analgesics"],
        when_urgent: "If it is sudden and intense, or comes with a stiff neck",
    },
    ConditionAdvice {
        condition: "Cough",
        aliases: &["cough", "tos"],
        causes: &["Common cold", "Allergy", "Throat irritation", "Asthma"],
        recommendations: &["Honey with lemon", "Stay hydrated", "Avoid irritants"],
        when_urgent: "If there is blood or difficulty breathing",
    },
    ConditionAdvice {
        condition: "Stomach ache",
        aliases: &["stomach ache", "stomachache", "dolor de estómago", "dolor de estomago"],
        causes: &["Indigestion", "Gastritis", "Stress", "Gastrointestinal infection"],
        recommendations: &["Bland diet", "Avoid irritating foods", "Hydration"],
        when_urgent: "If it is intense or comes with high fever or persistent vomiting",
    },
    ConditionAdvice {
        condition: "Dizziness",
        aliases: &["dizziness", "dizzy", "mareo"],
        causes: &["Dehydration", "Low blood pressure", "Vertigo", "Anemia"],
        recommendations: &["Sit or lie down", "Hydrate", "Move slowly"],
        when_urgent: "If it persists or comes with other neurological symptoms",
    },
];

impl ConditionAdvice {
    /// Render the advice as a short markdown block.
    pub fn render(&self) -> String {
        let causes = self.causes.iter().take(3).copied().collect::<Vec<_>>().join(", ");
        let recommendations = self
            .recommendations
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "About **{}**:\n\n**Possible causes:** {}\n\n**Recommendations:**\n{}\n\n**Seek urgent care:** {}",
            self.condition, causes, recommendations, self.when_urgent
        )
    }
}

lazy_static! {
    /// One case-insensitive, word-bounded alternation per entry of [`CONDITIONS`].
    static ref ALIAS_PATTERNS: Vec<Regex> = CONDITIONS
        .iter()
        .map(|advice| {
            let alternation = advice
                .aliases
                .iter()
                .map(|alias| regex::escape(alias))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).unwrap()
        })
        .collect();
}

/// Find the first known condition mentioned in a message.
pub fn lookup(message: &str) -> Option<&'static ConditionAdvice> {
    CONDITIONS
        .iter()
        .zip(ALIAS_PATTERNS.iter())
        .find(|(_, pattern)| pattern.is_match(message))
        .map(|(advice, _)| advice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_alias() {
        assert_eq!(lookup("Tengo FIEBRE desde ayer").unwrap().condition, "Fever");
        assert_eq!(lookup("bad headache today").unwrap().condition, "Headache");
        assert!(lookup("I need a new appointment").is_none());
    }

    #[test]
    fn test_aliases_match_whole_words_only() {
        assert!(lookup("Can I send you photos of my rash?").is_none());
        assert!(lookup("necesito mis datos de contacto").is_none());
        assert!(lookup("my feverish kid").is_none());

        assert_eq!(lookup("Tengo tos seca").unwrap().condition, "Cough");
        assert_eq!(lookup("TOS, mucha tos").unwrap().condition, "Cough");
        assert_eq!(lookup("dolor de estómago").unwrap().condition, "Stomach ache");
    }

    #[test]
    fn test_chest_pain_wins_over_generic_terms() {
        assert_eq!(
            lookup("chest pain and a little cough").unwrap().condition,
            "Chest pain"
        );
    }

    #[test]
    fn test_render_contains_sections() {
        let rendered = lookup("cough").unwrap().render();
        assert!(rendered.contains("**Cough**"));
        assert!(rendered.contains("- Avoid irritants"));
        assert!(rendered.contains("Seek urgent care"));
    }
}
