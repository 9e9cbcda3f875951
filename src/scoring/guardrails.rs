//! Compatibility guardrails run before any candidate is scored.

use chrono::{DateTime, Utc};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::engine::control::ModelCompatPolicy;
use crate::fingerprint::{model_family, Fingerprint, RequestMode};
use crate::store::CacheEntry;

/// Why a candidate was dropped. Rejections are silent towards the client;
/// the reason only feeds logs and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ModeMismatch,
    ToolSchemaMismatch,
    ModelIncompatible,
    SchemaValidationFailed,
    Expired,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::ModeMismatch => "mode_mismatch",
            RejectReason::ToolSchemaMismatch => "tool_schema_mismatch",
            RejectReason::ModelIncompatible => "model_incompatible",
            RejectReason::SchemaValidationFailed => "schema_validation_failed",
            RejectReason::Expired => "expired",
        }
    }
}

/// All gates must pass for a candidate to reach the scorer.
#[derive(Debug, Clone, Default)]
pub struct Guardrails;

impl Guardrails {
    pub fn new() -> Self {
        Self
    }

    /// Check a candidate against the request fingerprint. `schema` is the
    /// request's JSON schema when the mode is JSON_SCHEMA.
    pub fn check(
        &self,
        fingerprint: &Fingerprint,
        candidate: &CacheEntry,
        policy: ModelCompatPolicy,
        schema: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<(), RejectReason> {
        if fingerprint.mode != candidate.mode {
            return Err(RejectReason::ModeMismatch);
        }

        if fingerprint.tool_schema_hash != candidate.tool_schema_hash {
            return Err(RejectReason::ToolSchemaMismatch);
        }

        let model_ok = match policy {
            ModelCompatPolicy::Strict => fingerprint.model == candidate.model,
            ModelCompatPolicy::Family => {
                fingerprint.model_family == model_family(&candidate.model)
            }
            ModelCompatPolicy::Any => true,
        };
        if !model_ok {
            return Err(RejectReason::ModelIncompatible);
        }

        if fingerprint.mode == RequestMode::JsonSchema {
            if !cached_content_matches_schema(candidate, schema) {
                return Err(RejectReason::SchemaValidationFailed);
            }
        }

        // Defense in depth against stale index rows.
        if candidate.is_expired(now) {
            return Err(RejectReason::Expired);
        }

        Ok(())
    }
}

/// The cached assistant content must parse as JSON and validate against the
/// request's schema. A missing schema on a JSON_SCHEMA request admits the
/// candidate only when its content is at least well-formed JSON.
fn cached_content_matches_schema(candidate: &CacheEntry, schema: Option<&Value>) -> bool {
    let content = candidate
        .response_blob
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str);
    let Some(content) = content else {
        return false;
    };
    let Ok(parsed) = serde_json::from_str::<Value>(content) else {
        return false;
    };
    let Some(schema) = schema else {
        return true;
    };
    // OpenAI nests the actual schema under json_schema.schema.
    let schema_value = schema.get("schema").unwrap_or(schema);
    match JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema_value)
    {
        Ok(compiled) => compiled.is_valid(&parsed),
        Err(e) => {
            tracing::warn!(error = %e, "request JSON schema failed to compile; dropping candidate");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Fingerprinter, TemperatureBucket};
    use crate::types::request::{ChatCompletionRequest, Message, ResponseFormat};
    use serde_json::json;
    use uuid::Uuid;

    fn fingerprint(request: &ChatCompletionRequest) -> Fingerprint {
        Fingerprinter::new().fingerprint(request).unwrap()
    }

    fn candidate(mode: RequestMode, model: &str, tool_hash: &str, content: &str) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            id: Uuid::new_v4(),
            tenant: "default".into(),
            exact_key: "k".into(),
            simhash: 0,
            embedding: None,
            canonical_prompt: "user: hi".into(),
            raw_prompt_hmac: "d".into(),
            request_blob: json!({}),
            response_blob: json!({
                "id": "r", "object": "chat.completion", "created": 1, "model": model,
                "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
            }),
            model: model.into(),
            temperature_bucket: TemperatureBucket::Default,
            mode,
            tool_schema_hash: tool_hash.into(),
            hit_count: 0,
            last_hit_at: None,
            is_golden: false,
            pii_present: false,
            created_at: now,
            expires_at: Some(now + chrono::Duration::hours(1)),
        }
    }

    fn text_request() -> ChatCompletionRequest {
        ChatCompletionRequest::new("gpt-4", vec![Message::user("Return the user list")])
    }

    #[test]
    fn test_mode_gate() {
        let fp = fingerprint(&text_request());
        let cand = candidate(RequestMode::JsonObject, "gpt-4", "none", "{}");
        assert_eq!(
            Guardrails::new().check(&fp, &cand, ModelCompatPolicy::Strict, None, Utc::now()),
            Err(RejectReason::ModeMismatch)
        );
    }

    #[test]
    fn test_tool_schema_gate() {
        let req = text_request()
            .with_tools(vec![json!({"type": "function", "function": {"name": "get_weather"}})]);
        let fp = fingerprint(&req);
        let cand = candidate(RequestMode::Tools, "gpt-4", "different-hash", "ok");
        assert_eq!(
            Guardrails::new().check(&fp, &cand, ModelCompatPolicy::Strict, None, Utc::now()),
            Err(RejectReason::ToolSchemaMismatch)
        );
    }

    #[test]
    fn test_model_policies() {
        let fp = fingerprint(&text_request());
        let guards = Guardrails::new();
        let dated = candidate(RequestMode::Text, "gpt-4-0613", "none", "ok");

        assert_eq!(
            guards.check(&fp, &dated, ModelCompatPolicy::Strict, None, Utc::now()),
            Err(RejectReason::ModelIncompatible)
        );
        assert_eq!(
            guards.check(&fp, &dated, ModelCompatPolicy::Family, None, Utc::now()),
            Ok(())
        );

        let foreign = candidate(RequestMode::Text, "claude-3-opus", "none", "ok");
        assert_eq!(
            guards.check(&fp, &foreign, ModelCompatPolicy::Family, None, Utc::now()),
            Err(RejectReason::ModelIncompatible)
        );
        assert_eq!(
            guards.check(&fp, &foreign, ModelCompatPolicy::Any, None, Utc::now()),
            Ok(())
        );
    }

    #[test]
    fn test_schema_validation_gate() {
        let schema = json!({
            "type": "object",
            "properties": {"answer": {"type": "integer"}},
            "required": ["answer"]
        });
        let req = ChatCompletionRequest::new("gpt-4", vec![Message::user("compute")])
            .with_response_format(ResponseFormat::json_schema(schema.clone()));
        let fp = fingerprint(&req);
        let guards = Guardrails::new();

        let valid = candidate(RequestMode::JsonSchema, "gpt-4", "none", r#"{"answer": 4}"#);
        assert_eq!(
            guards.check(&fp, &valid, ModelCompatPolicy::Strict, Some(&schema), Utc::now()),
            Ok(())
        );

        let wrong_shape =
            candidate(RequestMode::JsonSchema, "gpt-4", "none", r#"{"answer": "four"}"#);
        assert_eq!(
            guards.check(&fp, &wrong_shape, ModelCompatPolicy::Strict, Some(&schema), Utc::now()),
            Err(RejectReason::SchemaValidationFailed)
        );

        let not_json = candidate(RequestMode::JsonSchema, "gpt-4", "none", "four");
        assert_eq!(
            guards.check(&fp, &not_json, ModelCompatPolicy::Strict, Some(&schema), Utc::now()),
            Err(RejectReason::SchemaValidationFailed)
        );
    }

    #[test]
    fn test_expired_candidate_dropped() {
        let fp = fingerprint(&text_request());
        let mut cand = candidate(RequestMode::Text, "gpt-4", "none", "ok");
        cand.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        assert_eq!(
            Guardrails::new().check(&fp, &cand, ModelCompatPolicy::Strict, None, Utc::now()),
            Err(RejectReason::Expired)
        );
    }

    #[test]
    fn test_clean_candidate_passes() {
        let fp = fingerprint(&text_request());
        let cand = candidate(RequestMode::Text, "gpt-4", "none", "here you go");
        assert_eq!(
            Guardrails::new().check(&fp, &cand, ModelCompatPolicy::Strict, None, Utc::now()),
            Ok(())
        );
    }
}
