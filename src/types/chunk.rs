//! Streaming chunk (delta) shape emitted on the SSE wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response::ChatCompletionResponse;

/// One streamed delta frame, `object = "chat.completion.chunk"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Partial message payload inside a chunk choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

impl ChatCompletionChunk {
    fn base(source: &ChatCompletionResponse) -> Self {
        Self {
            id: source.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: source.created,
            model: source.model.clone(),
            system_fingerprint: source.system_fingerprint.clone(),
            choices: Vec::new(),
        }
    }

    /// First chunk of a choice, carrying the role.
    pub fn role(source: &ChatCompletionResponse, index: u32, role: impl Into<String>) -> Self {
        let mut chunk = Self::base(source);
        chunk.choices.push(ChunkChoice {
            index,
            delta: Delta {
                role: Some(role.into()),
                ..Delta::default()
            },
            finish_reason: None,
        });
        chunk
    }

    /// Intermediate content chunk.
    pub fn content(source: &ChatCompletionResponse, index: u32, text: impl Into<String>) -> Self {
        let mut chunk = Self::base(source);
        chunk.choices.push(ChunkChoice {
            index,
            delta: Delta {
                content: Some(text.into()),
                ..Delta::default()
            },
            finish_reason: None,
        });
        chunk
    }

    /// Terminal chunk carrying the finish reason with an empty delta.
    pub fn finish(source: &ChatCompletionResponse, index: u32, reason: impl Into<String>) -> Self {
        let mut chunk = Self::base(source);
        chunk.choices.push(ChunkChoice {
            index,
            delta: Delta::default(),
            finish_reason: Some(reason.into()),
        });
        chunk
    }
}
