//! Deterministic tool/function schema hashing.
//!
//! Cached responses that were produced under one tool schema must never be
//! served to a request carrying a different one: `tools=[get_weather]` and
//! `tools=[get_weather, send_email]` hash differently and never match.

use serde_json::Value;

use crate::canonical::{canonicalize_value, sha256_hex, write_canonical};

/// Sentinel hash for requests without tools or functions.
pub const NO_TOOLS: &str = "none";

/// Compute the schema hash for a request's tool surface.
///
/// Tools take precedence over legacy functions; both empty yields the
/// [`NO_TOOLS`] sentinel.
pub fn hash_tool_surface(tools: Option<&[Value]>, functions: Option<&[Value]>) -> String {
    if let Some(tools) = tools {
        if !tools.is_empty() {
            return hash_tools(tools);
        }
    }
    if let Some(functions) = functions {
        if !functions.is_empty() {
            return hash_tools(functions);
        }
    }
    NO_TOOLS.to_string()
}

/// Hash a tool list: canonical JSON per tool (sorted keys, nulls dropped),
/// list sorted by tool name, list serialized, SHA-256. Order-independent:
/// `[A, B]` hashes the same as `[B, A]`.
pub fn hash_tools(tools: &[Value]) -> String {
    let mut canonical: Vec<(String, Value)> = tools
        .iter()
        .enumerate()
        .map(|(i, tool)| {
            let name = extract_tool_name(tool).unwrap_or_else(|| format!("tool_{}", i));
            let value = canonicalize_value(tool.clone()).unwrap_or(Value::Null);
            (name, value)
        })
        .collect();
    canonical.sort_by(|a, b| a.0.cmp(&b.0));

    let list = Value::Array(canonical.into_iter().map(|(_, v)| v).collect());
    sha256_hex(write_canonical(&list).as_bytes())
}

/// Extract the tool name from either the OpenAI nested format
/// (`{type: "function", function: {name}}`) or the flat `{name}` format.
fn extract_tool_name(tool: &Value) -> Option<String> {
    tool.get("function")
        .and_then(|f| f.get("name"))
        .or_else(|| tool.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather() -> Value {
        json!({"type": "function", "function": {"name": "get_weather", "parameters": {"type": "object", "properties": {"location": {"type": "string"}}}}})
    }

    fn email() -> Value {
        json!({"type": "function", "function": {"name": "send_email", "parameters": {"type": "object"}}})
    }

    #[test]
    fn test_sentinel_for_empty() {
        assert_eq!(hash_tool_surface(None, None), NO_TOOLS);
        assert_eq!(hash_tool_surface(Some(&[]), Some(&[])), NO_TOOLS);
    }

    #[test]
    fn test_order_independent() {
        let ab = hash_tools(&[weather(), email()]);
        let ba = hash_tools(&[email(), weather()]);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_superset_differs() {
        let one = hash_tools(&[weather()]);
        let two = hash_tools(&[weather(), email()]);
        assert_ne!(one, two);
    }

    #[test]
    fn test_key_order_inside_tool_is_irrelevant() {
        let a = json!({"function": {"name": "f", "parameters": {"a": 1, "b": 2}}, "type": "function"});
        let b = json!({"type": "function", "function": {"parameters": {"b": 2, "a": 1}, "name": "f"}});
        assert_eq!(hash_tools(&[a]), hash_tools(&[b]));
    }

    #[test]
    fn test_functions_fall_back_when_no_tools() {
        let f = [json!({"name": "legacy_fn", "parameters": {}})];
        let hash = hash_tool_surface(None, Some(&f));
        assert_ne!(hash, NO_TOOLS);
        assert_eq!(hash, hash_tools(&f));
    }
}
