//! Tolerant JSON object extraction from model output.
//!
//! Models wrap JSON in prose, use single quotes, leave trailing commas or
//! write `True`/`None`. The extractor takes the widest `{...}` span, tries a
//! strict parse, then applies a fixed set of normalizations and tries once
//! more. It never guesses beyond that.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// A JSON object recovered from model output.
pub type JsonObject = Map<String, Value>;

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("static regex"));

/// Extract a JSON object from free-form text.
pub fn extract_json(text: &str) -> Result<JsonObject, ParseError> {
    let candidate = widest_object_span(text).unwrap_or(text);

    if let Some(object) = parse_object(candidate) {
        return Ok(object);
    }

    let cleaned = normalize(candidate);
    parse_object(&cleaned).ok_or_else(|| ParseError::from_text(text))
}

/// First `{` to last `}`, inclusive. Nested or adjacent objects inside the
/// span are left for the parser to accept or reject.
fn widest_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn normalize(candidate: &str) -> String {
    let mut cleaned = candidate
        .trim()
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2019}', "'");

    // Only swap quote styles when there is no double quote at all,
    // otherwise apostrophes inside strings would be corrupted.
    if !cleaned.contains('"') && cleaned.matches('\'').count() >= 2 {
        cleaned = cleaned.replace('\'', "\"");
    }

    let cleaned = TRAILING_COMMA.replace_all(&cleaned, "$1");

    cleaned
        .replace("None", "null")
        .replace("True", "true")
        .replace("False", "false")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn strict_json_passes_through() {
        let parsed = extract_json(r#"{"sentiment": "neutral"}"#).unwrap();
        assert_eq!(parsed, object(json!({"sentiment": "neutral"})));
    }

    #[test]
    fn single_quotes_and_trailing_comma_recover() {
        let parsed =
            extract_json("Sure! {'sentiment': 'negative', 'topic': 'billing',}").unwrap();
        assert_eq!(
            parsed,
            object(json!({"sentiment": "negative", "topic": "billing"}))
        );
    }

    #[test]
    fn prose_and_markdown_fences_are_ignored() {
        let text = "Here is the classification:\n```json\n{\"sentiment\": \"positive\",\n \"topic\": \"app\"}\n```\nHope that helps.";
        let parsed = extract_json(text).unwrap();
        assert_eq!(parsed["topic"], "app");
    }

    #[test]
    fn trailing_comma_in_nested_array() {
        let parsed = extract_json(r#"{"tags": ["a", "b",], "n": 1,}"#).unwrap();
        assert_eq!(parsed, object(json!({"tags": ["a", "b"], "n": 1})));
    }

    #[test]
    fn smart_quotes_are_straightened() {
        let parsed = extract_json("{\u{201C}sentiment\u{201D}: \u{201C}neutral\u{201D}}").unwrap();
        assert_eq!(parsed["sentiment"], "neutral");
    }

    #[test]
    fn python_literals_are_fixed() {
        let parsed = extract_json(r#"{"escalate": True, "reason": None, "done": False}"#).unwrap();
        assert_eq!(
            parsed,
            object(json!({"escalate": true, "reason": null, "done": false}))
        );
    }

    #[test]
    fn apostrophes_survive_when_double_quotes_present() {
        let parsed = extract_json(r#"{"note": "it's fine", "x": 1,}"#).unwrap();
        assert_eq!(parsed["note"], "it's fine");
    }

    #[test]
    fn nested_objects_inside_widest_span() {
        let parsed = extract_json(r#"result: {"a": {"b": 1}} end"#).unwrap();
        assert_eq!(parsed["a"]["b"], 1);
    }

    #[test]
    fn adjacent_objects_fail_as_one_span() {
        // Widest span is `{"a": 1} and {"b": 2}` which is not valid JSON.
        assert!(extract_json(r#"{"a": 1} and {"b": 2}"#).is_err());
    }

    #[test]
    fn no_brace_is_parse_error() {
        let err = extract_json("I cannot classify this message.").unwrap_err();
        assert_eq!(err.snippet, "I cannot classify this message.");
    }

    #[test]
    fn non_object_json_is_parse_error() {
        assert!(extract_json(r#"["positive"]"#).is_err());
        assert!(extract_json("42").is_err());
    }

    #[test]
    fn garbage_between_braces_is_parse_error() {
        assert!(extract_json("{ this is not json }").is_err());
    }

    #[test]
    fn error_snippet_is_truncated() {
        let text = format!("{{ broken {}", "y".repeat(1000));
        let err = extract_json(&text).unwrap_err();
        assert_eq!(err.snippet.chars().count(), 600);
        assert!(text.starts_with(&err.snippet));
    }
}
