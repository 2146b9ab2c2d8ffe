//! Conversational intents the chat fallback can answer without a backend.
//!
//! Emergencies are not an intent here: [`crate::SafetyFilter`] handles them
//! before any other chat processing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// What a chat message is about, when it is not a clinical question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatIntent {
    Appointment,
    Farewell,
    Wellbeing,
    Greeting,
    Acknowledgement,
    /// Mentions a symptom the knowledge base does not cover
    SymptomFollowUp,
}

lazy_static! {
    /// Checked in order; the first match wins.
    static ref INTENT_PATTERNS: Vec<(ChatIntent, Regex)> = vec![
        (
            ChatIntent::Appointment,
            Regex::new(r"(?i)\b(citas?|turnos?|reservar|agendar|appointments?|book|schedule)\b").unwrap(),
        ),
        (
            ChatIntent::Farewell,
            Regex::new(r"(?i)\b(adi[oó]s|chao|bye|goodbye|hasta luego|nos vemos|see you)\b").unwrap(),
        ),
        (
            ChatIntent::Wellbeing,
            Regex::new(r"(?i)\b(c[oó]mo est[aá]s|todo bien|how are you)\b").unwrap(),
        ),
        (
            ChatIntent::Greeting,
            Regex::new(
                r"(?i)\b(hola|buen[oa]s|hi|hello|hey|good (?:morning|afternoon|evening)|qu[eé] tal)\b"
            )
            .unwrap(),
        ),
        (
            ChatIntent::Acknowledgement,
            Regex::new(
                r"(?i)\b(ok|okay|vale|entendido|listo|bueno|gracias|perfecto|thanks|thank you|got it)\b"
            )
            .unwrap(),
        ),
        (
            ChatIntent::SymptomFollowUp,
            Regex::new(
                r"(?i)\b(dolor|molestias?|ardor|picaz[oó]n|hinchaz[oó]n|sangrado|cansancio|debilidad|pain|aches?|itch\w*|swelling|bleeding|tired\w*|fatigue|weak\w*|sore)\b"
            )
            .unwrap(),
        ),
    ];
}

/// Canned answer for an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentReply {
    pub text: &'static str,
    pub suggestions: &'static [&'static str],
}

const APPOINTMENT: IntentReply = IntentReply {
    text: "To book a medical appointment, open the Appointments section of the main menu or \
           contact reception.",
    suggestions: &["See available appointments", "Check doctors' schedules"],
};

const FAREWELL: IntentReply = IntentReply {
    text: "Thanks for reaching out. Remember that this information is for guidance only; for an \
           accurate diagnosis always consult a healthcare professional. Take care!",
    suggestions: &[],
};

const WELLBEING: IntentReply = IntentReply {
    text: "I'm up and ready to help! I'm an AI assistant designed to support you with health \
           questions.",
    suggestions: &["I have a pain", "I want to book an appointment"],
};

const GREETING: IntentReply = IntentReply {
    text: "Hello! I'm the Vitalis medical assistant. I can help with general health questions. \
           How can I help you today?",
    suggestions: &["What symptoms do you have?", "Book an appointment", "Ask about medication"],
};

const ACKNOWLEDGEMENT: IntentReply = IntentReply {
    text: "Glad I could help. Do you have any other question about your health or symptoms?",
    suggestions: &["No, thanks", "Yes, I have another question"],
};

const SYMPTOM_FOLLOW_UP: IntentReply = IntentReply {
    text: "I understand you have some symptoms. To guide you better I need a bit more \
           information:\n\n\
           1. Since when have you had these symptoms?\n\
           2. Where in the body are they located?\n\
           3. Have you taken any medication?\n\
           4. Have the symptoms got worse or better?\n\n\
           If the symptoms are severe, please go to the emergency department.",
    suggestions: &["Describe specific symptoms", "Book a medical consultation"],
};

impl ChatIntent {
    pub fn reply(&self) -> &'static IntentReply {
        match self {
            ChatIntent::Appointment => &APPOINTMENT,
            ChatIntent::Farewell => &FAREWELL,
            ChatIntent::Wellbeing => &WELLBEING,
            ChatIntent::Greeting => &GREETING,
            ChatIntent::Acknowledgement => &ACKNOWLEDGEMENT,
            ChatIntent::SymptomFollowUp => &SYMPTOM_FOLLOW_UP,
        }
    }
}

/// Classify a chat message. `None` means no local intent applies.
pub fn classify(message: &str) -> Option<ChatIntent> {
    INTENT_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(message))
        .map(|(intent, _)| *intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting() {
        assert_eq!(classify("Hola!"), Some(ChatIntent::Greeting));
        assert_eq!(classify("good morning"), Some(ChatIntent::Greeting));
    }

    #[test]
    fn test_wellbeing_beats_greeting() {
        assert_eq!(classify("hola, ¿cómo estás?"), Some(ChatIntent::Wellbeing));
        assert_eq!(classify("How are you?"), Some(ChatIntent::Wellbeing));
    }

    #[test]
    fn test_acknowledgement() {
        assert_eq!(classify("ok, gracias"), Some(ChatIntent::Acknowledgement));
        assert_eq!(classify("Thanks"), Some(ChatIntent::Acknowledgement));
    }

    #[test]
    fn test_farewell_beats_acknowledgement() {
        assert_eq!(classify("gracias, adiós"), Some(ChatIntent::Farewell));
        assert_eq!(classify("bye"), Some(ChatIntent::Farewell));
    }

    #[test]
    fn test_appointment_beats_greeting() {
        assert_eq!(classify("Hola, quiero agendar una cita"), Some(ChatIntent::Appointment));
        assert_eq!(classify("Can I book a visit?"), Some(ChatIntent::Appointment));
    }

    #[test]
    fn test_symptom_follow_up() {
        assert_eq!(classify("tengo un dolor en la rodilla"), Some(ChatIntent::SymptomFollowUp));
        assert_eq!(classify("my ankle is swelling"), Some(ChatIntent::SymptomFollowUp));
    }

    #[test]
    fn test_words_are_not_matched_inside_other_words() {
        // "hi" in "this", "ok" in "took", "book" in "notebook"
        assert_eq!(classify("this notebook took ages"), None);
        assert_eq!(classify("opening hours?"), None);
    }

    #[test]
    fn test_every_intent_has_a_reply() {
        for (intent, _) in INTENT_PATTERNS.iter() {
            assert!(!intent.reply().text.is_empty());
        }
        assert!(ChatIntent::Farewell.reply().suggestions.is_empty());
    }
}
