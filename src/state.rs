//! Loose navigation of the page's embedded state JSON.
//!
//! The `state-view` script blob has no stable schema: the same page can
//! render its data under a `views` map or a `stack` list, with several
//! different nestings below either. Everything here is best-effort lookup
//! over a dynamic `serde_json::Value`; a missing key is an expected outcome,
//! not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Precompiled regex for the inline state script
static STATE_SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<script[^>]*class="state-view"[^>]*>(.*?)</script>"#)
        .expect("Invalid state script regex")
});

/// Parse the inline `state-view` JSON blob, if the page carries one.
pub fn parse_state(html: &str) -> Option<Value> {
    let raw = STATE_SCRIPT_RE.captures(html)?.get(1)?.as_str();
    serde_json::from_str(raw).ok()
}

/// Entries of the `views` map in document order.
pub fn views(state: &Value) -> Vec<&Value> {
    match state.get("views") {
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}

/// Entries of the `stack` list in order.
pub fn stack(state: &Value) -> Vec<&Value> {
    match state.get("stack") {
        Some(Value::Array(items)) => items.iter().collect(),
        _ => Vec::new(),
    }
}

/// Coerce a JSON scalar to a string, accepting both numbers and strings.
/// The page is inconsistent about which one it emits for ids.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a JSON scalar to f64, accepting both numbers and numeric strings.
pub fn scalar_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
