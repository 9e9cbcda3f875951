//! Canonical request form and exact-key generation.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::request::ChatCompletionRequest;
use crate::Result;

/// Fields whose documented-default values are dropped from the canonical
/// form, so a request that spells out a default hashes identically to one
/// that omits it.
const NUMERIC_DEFAULTS: &[(&str, f64)] = &[
    ("temperature", 1.0),
    ("top_p", 1.0),
    ("n", 1.0),
    ("presence_penalty", 0.0),
    ("frequency_penalty", 0.0),
];

const BOOLEAN_DEFAULTS: &[(&str, bool)] = &[("stream", false)];

const FLOAT_EPSILON: f64 = 1e-4;

/// Canonicalization result: the deterministic serialization and its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    /// Deterministic JSON: sorted keys, defaults and nulls dropped, floats
    /// rounded, strings whitespace-normalized, no insignificant whitespace.
    pub json: String,
    /// Lowercase hex SHA-256 of `json`.
    pub exact_key: String,
}

/// Canonicalizes chat completion requests for stable cache keys.
///
/// Steps:
/// 1. Remove null values and documented defaults
/// 2. Sort JSON keys recursively
/// 3. Round floating point numbers (2 decimals, half-up)
/// 4. Normalize whitespace in strings
/// 5. Serialize deterministically and hash with SHA-256
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer;

impl Canonicalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn canonicalize(&self, request: &ChatCompletionRequest) -> Result<Canonical> {
        let node = serde_json::to_value(request)?;
        let canonical = canonicalize_value(node).unwrap_or(Value::Null);
        let json = write_canonical(&canonical);
        let exact_key = sha256_hex(json.as_bytes());
        Ok(Canonical { json, exact_key })
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Recursively canonicalize a JSON value. Returns `None` when the value
/// collapses to nothing (null, or an omitted default).
pub(crate) fn canonicalize_value(node: Value) -> Option<Value> {
    match node {
        Value::Null => None,
        Value::Object(map) => {
            let mut canonical = serde_json::Map::new();
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in entries {
                if value.is_null() || is_default_value(&key, &value) {
                    continue;
                }
                if let Some(v) = canonicalize_value(value) {
                    canonical.insert(key, v);
                }
            }
            Some(Value::Object(canonical))
        }
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(canonicalize_value).collect(),
        )),
        Value::Number(n) => Some(canonicalize_number(n)),
        Value::String(s) => Some(Value::String(normalize_string(&s))),
        other => Some(other),
    }
}

/// Round non-integral numbers to two decimal places, half-up.
fn canonicalize_number(n: serde_json::Number) -> Value {
    if n.is_i64() || n.is_u64() {
        return Value::Number(n);
    }
    let value = n.as_f64().unwrap_or(0.0);
    let rounded = round_half_up(value, 2);
    serde_json::Number::from_f64(rounded)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn round_half_up(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    let scaled = value * scale;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5).floor()
    } else {
        (scaled - 0.5).ceil()
    };
    rounded / scale
}

/// Trim and collapse internal whitespace runs to a single space.
fn normalize_string(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_default_value(field: &str, value: &Value) -> bool {
    for (name, default) in NUMERIC_DEFAULTS {
        if *name == field {
            if let Some(actual) = value.as_f64() {
                return (actual - default).abs() < FLOAT_EPSILON;
            }
        }
    }
    for (name, default) in BOOLEAN_DEFAULTS {
        if *name == field {
            if let Some(actual) = value.as_bool() {
                return actual == *default;
            }
        }
    }
    false
}

/// Serialize a canonicalized value deterministically: sorted keys, no
/// insignificant whitespace, escapes limited to quote, backslash, CR, LF and
/// TAB.
pub(crate) fn write_canonical(node: &Value) -> String {
    let mut out = String::new();
    write_value(node, &mut out);
    out
}

fn write_value(node: &Value, out: &mut String) {
    match node {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => {
            out.push('"');
            escape_into(s, out);
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                escape_into(key, out);
                out.push_str("\":");
                write_value(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &serde_json::Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else {
        let f = n.as_f64().unwrap_or(0.0);
        if f.fract() == 0.0 && f.abs() < 9e15 {
            out.push_str(&format!("{}", f as i64));
        } else {
            out.push_str(&format!("{}", f));
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::request::Message;
    use serde_json::json;

    fn request(raw: Value) -> ChatCompletionRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_defaults_are_dropped() {
        let canon = Canonicalizer::new();
        let bare = canon
            .canonicalize(&request(json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .unwrap();
        let spelled = canon
            .canonicalize(&request(json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 1.0,
                "top_p": 1.0,
                "n": 1,
                "stream": false,
                "presence_penalty": 0.0,
                "frequency_penalty": 0.0
            })))
            .unwrap();
        assert_eq!(bare.exact_key, spelled.exact_key);
        assert_eq!(bare.json, spelled.json);
    }

    #[test]
    fn test_key_order_insensitive() {
        let canon = Canonicalizer::new();
        let a = canon
            .canonicalize(&request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "model": "gpt-4",
                "zeta": {"b": 1, "a": 2},
                "alpha": true
            })))
            .unwrap();
        let b = canon
            .canonicalize(&request(json!({
                "alpha": true,
                "zeta": {"a": 2, "b": 1},
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .unwrap();
        assert_eq!(a.exact_key, b.exact_key);
    }

    #[test]
    fn test_idempotence() {
        let canon = Canonicalizer::new();
        let req = request(json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "  lots   of\twhitespace "}],
            "temperature": 0.756
        }));
        let first = canon.canonicalize(&req).unwrap();
        // Re-parse the canonical JSON and canonicalize again.
        let reparsed: ChatCompletionRequest = serde_json::from_str(&first.json).unwrap();
        let second = canon.canonicalize(&reparsed).unwrap();
        assert_eq!(first.json, second.json);
        assert_eq!(first.exact_key, second.exact_key);
    }

    #[test]
    fn test_float_rounding_half_up() {
        assert_eq!(round_half_up(0.756, 2), 0.76);
        assert_eq!(round_half_up(0.754, 2), 0.75);
        assert_eq!(round_half_up(0.755, 2), 0.76);
        assert_eq!(round_half_up(-0.755, 2), -0.76);
    }

    #[test]
    fn test_string_normalization() {
        assert_eq!(normalize_string("  a \t b\n\nc "), "a b c");
    }

    #[test]
    fn test_null_and_absent_collapse() {
        let canon = Canonicalizer::new();
        let with_null = canon
            .canonicalize(&request(json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}],
                "seed": null
            })))
            .unwrap();
        let without = canon
            .canonicalize(&request(json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .unwrap();
        assert_eq!(with_null.exact_key, without.exact_key);
    }

    #[test]
    fn test_writer_escapes() {
        let value = canonicalize_value(json!({"text": "line\nbreak \"quoted\" back\\slash"})).unwrap();
        let out = write_canonical(&value);
        // normalize_string collapses the newline into a space first
        assert_eq!(out, r#"{"text":"line break \"quoted\" back\\slash"}"#);
    }

    #[test]
    fn test_exact_key_is_lowercase_hex() {
        let canon = Canonicalizer::new();
        let c = canon
            .canonicalize(&ChatCompletionRequest::new(
                "gpt-4",
                vec![Message::user("What is 2+2?")],
            ))
            .unwrap();
        assert_eq!(c.exact_key.len(), 64);
        assert!(c.exact_key.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }
}
