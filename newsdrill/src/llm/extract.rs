//! Recover a JSON payload from free-form model output.

use serde_json::Value;
use tracing::{debug, error};

type Strategy = fn(&str) -> Option<Value>;

/// Tried in order; the first that yields an array or object wins.
const STRATEGIES: [(&str, Strategy); 3] = [
    ("whole text", parse_whole),
    ("json fence", parse_fenced),
    ("bracketed span", parse_bracketed),
];

/// Extract the JSON array or object carried by `text`.
/// Returns an empty array when nothing can be recovered.
pub fn extract_json(text: &str) -> Value {
    for (name, strategy) in STRATEGIES.iter() {
        if let Some(value) = strategy(text) {
            debug!(strategy = *name, "extracted JSON from model output");
            return value;
        }
    }
    error!(raw = %text, "no JSON payload found in model output");
    Value::Array(Vec::new())
}

fn structured(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(v @ Value::Array(_)) | Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

fn parse_whole(text: &str) -> Option<Value> {
    structured(text)
}

/// Content of the first ```json fenced block
fn parse_fenced(text: &str) -> Option<Value> {
    const OPEN: &str = "```json";
    let start = text.find(OPEN)? + OPEN.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    structured(&rest[..end])
}

/// From the first '[' to the last ']'
fn parse_bracketed(text: &str) -> Option<Value> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    structured(&text[start..=end])
}
