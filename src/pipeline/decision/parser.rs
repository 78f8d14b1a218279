use std::sync::LazyLock;

use regex::Regex;

use super::types::{Decision, DecisionKind};

/// ```json fenced block, tolerant of surrounding prose.
static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());

/// Any fenced block, with an optional language tag.
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)\s*```").unwrap());

/// Outcome of pulling a JSON object out of model text.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtraction {
    Parsed(serde_json::Value),
    Fallback { raw_text: String, reason: String },
}

/// Locate and parse the JSON object in a model reply.
///
/// Tried in order: a ```json fence, any fence, the whole trimmed text, then
/// the first balanced `{…}` object. The first candidate that parses to a JSON
/// object wins.
pub fn extract_json(text: &str) -> JsonExtraction {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return JsonExtraction::Fallback {
            raw_text: text.to_string(),
            reason: "empty response".into(),
        };
    }

    let mut candidates: Vec<&str> = Vec::with_capacity(4);
    if let Some(inner) = JSON_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        candidates.push(inner.as_str());
    }
    if let Some(inner) = ANY_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        candidates.push(inner.as_str());
    }
    candidates.push(trimmed);
    if let Some(object) = first_balanced_object(trimmed) {
        candidates.push(object);
    }

    let mut last_error = String::from("no JSON object found");
    for candidate in candidates {
        match serde_json::from_str::<serde_json::Value>(candidate.trim()) {
            Ok(value @ serde_json::Value::Object(_)) => return JsonExtraction::Parsed(value),
            Ok(_) => last_error = "response JSON is not an object".into(),
            Err(e) => last_error = e.to_string(),
        }
    }

    JsonExtraction::Fallback {
        raw_text: text.to_string(),
        reason: last_error,
    }
}

/// First `{…}` span whose braces balance, skipping braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Turn the authoritative model text into a `Decision`.
///
/// Never fails: anything without a recognizable `decision` becomes an
/// UNCERTAIN decision that carries the raw text.
pub fn parse_decision(text: &str) -> Decision {
    let object = match extract_json(text) {
        JsonExtraction::Parsed(serde_json::Value::Object(map)) => map,
        JsonExtraction::Parsed(_) => return Decision::unparseable("response JSON is not an object", text),
        JsonExtraction::Fallback { reason, .. } => {
            tracing::warn!(reason = %reason, "Decision response was not parseable JSON");
            return Decision::unparseable(&reason, text);
        }
    };

    let mut extra = object;
    let kind = match extra.remove("decision") {
        Some(serde_json::Value::String(s)) => DecisionKind::parse(&s),
        _ => None,
    };
    let Some(kind) = kind else {
        tracing::warn!("Decision response JSON has no valid decision field");
        return Decision::unparseable("missing or invalid decision field", text);
    };

    let explanation = match extra.remove("explanation") {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    // Keys the pipeline owns are never taken from the model.
    for owned in ["raw_response", "google_search_grounding", "clinic_verification_enabled"] {
        extra.remove(owned);
    }

    Decision {
        extra,
        ..Decision::new(kind, explanation)
    }
}
