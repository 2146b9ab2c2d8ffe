//! Tolerant JSON extraction from model output.
//!
//! Models asked for JSON still wrap it in prose or markdown fences. The
//! extractor tries, in order:
//! 1. the whole text as a JSON object
//! 2. the body of the first ```` ```json ```` (or bare ```` ``` ````) fence
//! 3. each balanced `{...}` span, scanning left to right, for at most
//!    [`MAX_BRACE_CANDIDATES`] opening braces
//!
//! It never fails: unusable text becomes [`Extraction::Failed`].

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

/// A JSON object as returned by a backend.
pub type JsonObject = Map<String, JsonValue>;

/// Key set on the sentinel record produced for unparseable text.
pub const PARSE_FAILED_KEY: &str = "parse_failed";

/// Opening braces tried by the balanced scan. Each try is linear in the
/// text length, so the whole scan is too.
pub const MAX_BRACE_CANDIDATES: usize = 32;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap();
}

/// Result of extracting a JSON object from free text.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Parsed(JsonObject),
    Failed { raw: String },
}

impl Extraction {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Extraction::Parsed(_))
    }

    pub fn object(&self) -> Option<&JsonObject> {
        match self {
            Extraction::Parsed(object) => Some(object),
            Extraction::Failed { .. } => None,
        }
    }

    /// Flatten into a single record; failures become
    /// `{"parse_failed": true, "raw": <text>}`.
    pub fn into_record(self) -> JsonObject {
        match self {
            Extraction::Parsed(object) => object,
            Extraction::Failed { raw } => {
                let mut record = JsonObject::new();
                record.insert(PARSE_FAILED_KEY.to_string(), JsonValue::Bool(true));
                record.insert("raw".to_string(), JsonValue::String(raw));
                record
            }
        }
    }
}

/// Pulls the first JSON object out of model output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeJsonExtractor;

impl SafeJsonExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> Extraction {
        let trimmed = text.trim();

        if let Some(object) = parse_object(trimmed) {
            return Extraction::Parsed(object);
        }

        if let Some(body) = FENCED_BLOCK.captures(trimmed).and_then(|c| c.get(1)) {
            if let Some(object) = parse_object(body.as_str().trim()) {
                return Extraction::Parsed(object);
            }
        }

        for (start, _) in trimmed.match_indices('{').take(MAX_BRACE_CANDIDATES) {
            if let Some(end) = balanced_end(&trimmed[start..]) {
                if let Some(object) = parse_object(&trimmed[start..start + end]) {
                    return Extraction::Parsed(object);
                }
            }
        }

        tracing::warn!(length = text.len(), "No JSON object found in model output");
        Extraction::Failed {
            raw: text.to_string(),
        }
    }
}

fn parse_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<JsonValue>(candidate) {
        Ok(JsonValue::Object(object)) => Some(object),
        _ => None,
    }
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
/// Braces inside string literals are ignored.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn extract(text: &str) -> Extraction {
        SafeJsonExtractor::new().extract(text)
    }

    #[test]
    fn test_plain_object() {
        let object = extract(r#"{"score": 70, "priority": "HIGH"}"#).into_record();
        assert_eq!(object["score"], 70);
    }

    #[test]
    fn test_fenced_object() {
        let text = "Here is the result:\n```json\n{\"response\": \"Drink water\", \"confidence\": 0.9}\n```\nHope it helps.";
        let extraction = extract(text);
        assert!(extraction.is_parsed());
        assert_eq!(extraction.object().unwrap()["response"], "Drink water");
    }

    #[test]
    fn test_bare_fence() {
        let extraction = extract("```\n{\"summary\": \"ok\"}\n```");
        assert_eq!(extraction.object().unwrap()["summary"], "ok");
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let text = "Sure! {\"notes\": \"use {braces} carefully\", \"nested\": {\"a\": 1}} and that's it {";
        let object = extract(text).into_record();
        assert_eq!(object["notes"], "use {braces} carefully");
        assert_eq!(object["nested"]["a"], 1);
    }

    #[test]
    fn test_skips_unparseable_leading_span() {
        let text = "{not json} then {\"ok\": true}";
        assert_eq!(extract(text).into_record()["ok"], true);
    }

    #[test]
    fn test_brace_scan_is_bounded() {
        let flood = format!("{}{}", "{".repeat(50_000), r#"{"ok": true}"#);
        assert!(!extract(&flood).is_parsed());

        let junk = "{x} ".repeat(MAX_BRACE_CANDIDATES - 1);
        let within = format!("{}{}", junk, r#"{"ok": true}"#);
        assert_eq!(extract(&within).into_record()["ok"], true);

        let beyond = format!("{}{{x}} {}", junk, r#"{"ok": true}"#);
        assert!(!extract(&beyond).is_parsed());
    }

    #[test]
    fn test_array_is_not_an_object() {
        assert!(!extract("[1, 2, 3]").is_parsed());
    }

    #[test]
    fn test_failure_sentinel() {
        let record = extract("the model rambled without any json").into_record();
        assert_eq!(record[PARSE_FAILED_KEY], true);
        assert_eq!(record["raw"], "the model rambled without any json");
    }

    #[test]
    fn test_escaped_quotes_in_strings() {
        let text = r#"prefix {"response": "he said \"hi}\" loudly"} suffix"#;
        assert_eq!(
            extract(text).into_record()["response"],
            "he said \"hi}\" loudly"
        );
    }

    proptest! {
        #[test]
        fn prop_extract_never_panics(text in ".{0,200}") {
            let _ = SafeJsonExtractor::new().extract(&text);
        }

        #[test]
        fn prop_wrapped_object_is_recovered(prefix in "[a-zA-Z ,.!]{0,40}", suffix in "[a-zA-Z ,.!]{0,40}", n in 0i64..1000) {
            let text = format!("{}{{\"value\": {}}}{}", prefix, n, suffix);
            let extraction = SafeJsonExtractor::new().extract(&text);
            prop_assert_eq!(extraction.object().map(|o| o["value"].clone()), Some(JsonValue::from(n)));
        }
    }
}
