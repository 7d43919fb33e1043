//! Completion → storable messages.
//!
//! Parsing never fails: anything that is not a JSON array (or an object with a `messages` array)
//! yields no candidates. Sanitizing strips `[..]`, `{{..}}` and `{..}` placeholders and normalizes
//! whitespace; applying it twice changes nothing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Upper bound on messages kept from one completion.
pub const MAX_MESSAGES: usize = 3;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?[ \t]*\r?\n?(.*?)```").expect("fence regex"));
static BRACKET_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("bracket regex"));
static DOUBLE_CURLY_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^}]*\}\}").expect("double curly regex"));
static CURLY_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^}]*\}").expect("curly regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("whitespace regex"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,.:;!?])").expect("punctuation regex"));

/// Inner text of the first fenced block, or the whole completion, trimmed.
pub fn extract_payload(raw: &str) -> &str {
    match FENCED_BLOCK.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Candidate messages from a raw completion, trimmed, blanks dropped, order preserved.
pub fn parse_candidates(raw: &str) -> Vec<String> {
    let payload = extract_payload(raw);
    let parsed: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "completion payload is not JSON");
            return Vec::new();
        }
    };

    let items = match &parsed {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("messages") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(value_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn strip_placeholders(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = BRACKET_PLACEHOLDER.replace_all(&current, "");
        let next = DOUBLE_CURLY_PLACEHOLDER.replace_all(&next, "");
        let next = CURLY_PLACEHOLDER.replace_all(&next, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Placeholder-free, whitespace-normalized message. May be empty.
pub fn sanitize_message(message: &str) -> String {
    let stripped = strip_placeholders(message);
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    let tightened = SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1");
    tightened.trim().to_string()
}

/// Parse, sanitize, drop empties, keep at most [`MAX_MESSAGES`]. Never pads.
pub fn extract_messages(raw: &str) -> Vec<String> {
    parse_candidates(raw)
        .iter()
        .map(|m| sanitize_message(m))
        .filter(|m| !m.is_empty())
        .take(MAX_MESSAGES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_ignores_surrounding_prose() {
        let raw = "Sure! Here you go:\n```json\n{\"messages\": [\"Hi Ana\", \"Hello\"]}\n```\nLet me know.";
        assert_eq!(extract_messages(raw), vec!["Hi Ana", "Hello"]);
    }

    #[test]
    fn untagged_fence_and_bare_array() {
        let raw = "```\n[\"one\", \"two\"]\n```";
        assert_eq!(extract_messages(raw), vec!["one", "two"]);
        assert_eq!(extract_messages("  [\"solo\"]  "), vec!["solo"]);
    }

    #[test]
    fn unusable_shapes_yield_nothing() {
        assert!(extract_messages("not json at all").is_empty());
        assert!(extract_messages(r#"{"foo": 1}"#).is_empty());
        assert!(extract_messages(r#"{"messages": "hi"}"#).is_empty());
        assert!(extract_messages("42").is_empty());
        assert!(extract_messages("").is_empty());
    }

    #[test]
    fn scalars_are_coerced_and_blanks_dropped() {
        let raw = r#"{"messages": ["  a  ", "", "   ", 7, true, null, {"x": 1}]}"#;
        assert_eq!(parse_candidates(raw), vec!["a", "7", "true"]);
    }

    #[test]
    fn surplus_is_truncated_in_order() {
        let raw = r#"["m1", "m2", "m3", "m4", "m5"]"#;
        assert_eq!(extract_messages(raw), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn placeholders_and_spacing_are_cleaned() {
        let out = sanitize_message("Hi [Name] , I saw {{company}} is hiring {role} !  Talk soon.");
        assert_eq!(out, "Hi, I saw is hiring! Talk soon.");
        assert!(!out.contains('['));
        assert!(!out.contains('{'));
        assert!(!out.contains("  "));
    }

    #[test]
    fn nested_placeholders_leave_no_pairs() {
        for input in ["{{{x}}}", "[[x]]", "{[x]}", "a {b {c} d} e", "Hi [a[b]c] there"] {
            let once = sanitize_message(input);
            assert!(!BRACKET_PLACEHOLDER.is_match(&once), "{input} -> {once}");
            assert!(!CURLY_PLACEHOLDER.is_match(&once), "{input} -> {once}");
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "Hi [Name] , I saw {{company}} is hiring {role} !",
            "  spaced \t\t out ,  text  .",
            "{[}] odd } [ mix ]]",
            "Olá ! Tudo bem ?",
        ];
        for input in inputs {
            let once = sanitize_message(input);
            assert_eq!(sanitize_message(&once), once, "input: {input}");
        }
    }

    #[test]
    fn placeholder_only_messages_are_dropped() {
        let raw = r#"["[Your Name]", "{{greeting}}", "Real message"]"#;
        assert_eq!(extract_messages(raw), vec!["Real message"]);
    }
}
