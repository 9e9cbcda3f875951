//! Miss passthrough with reassembly capture.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

use crate::types::response::{ChatCompletionResponse, Choice, ResponseMessage, Usage};
use crate::BoxStream;

/// Incrementally rebuilds a full chat completion from streamed delta frames.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    system_fingerprint: Option<String>,
    usage: Option<Usage>,
    choices: BTreeMap<u32, AssemblingChoice>,
    saw_done: bool,
}

#[derive(Debug, Default)]
struct AssemblingChoice {
    role: Option<String>,
    content: String,
    has_content: bool,
    finish_reason: Option<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one parsed chunk payload.
    pub fn feed(&mut self, payload: &Value) {
        if self.id.is_none() {
            self.id = payload["id"].as_str().map(str::to_string);
        }
        if self.model.is_none() {
            self.model = payload["model"].as_str().map(str::to_string);
        }
        if self.created.is_none() {
            self.created = payload["created"].as_i64();
        }
        if self.system_fingerprint.is_none() {
            self.system_fingerprint = payload["system_fingerprint"].as_str().map(str::to_string);
        }
        if let Ok(usage) = serde_json::from_value::<Usage>(payload["usage"].clone()) {
            self.usage = Some(usage);
        }

        let Some(choices) = payload["choices"].as_array() else {
            return;
        };
        for choice in choices {
            let index = choice["index"].as_u64().unwrap_or(0) as u32;
            let slot = self.choices.entry(index).or_default();
            if let Some(role) = choice["delta"]["role"].as_str() {
                slot.role = Some(role.to_string());
            }
            if let Some(content) = choice["delta"]["content"].as_str() {
                slot.content.push_str(content);
                slot.has_content = true;
            }
            if let Some(reason) = choice["finish_reason"].as_str() {
                slot.finish_reason = Some(reason.to_string());
            }
        }
    }

    pub fn mark_done(&mut self) {
        self.saw_done = true;
    }

    pub fn is_complete(&self) -> bool {
        self.saw_done
    }

    /// Synthesize the full non-streaming response. `None` until the terminal
    /// marker arrived; partial streams never become cache entries.
    pub fn into_response(self) -> Option<ChatCompletionResponse> {
        if !self.saw_done {
            return None;
        }
        let choices = self
            .choices
            .into_iter()
            .map(|(index, c)| Choice {
                index,
                message: ResponseMessage {
                    role: c.role.unwrap_or_else(|| "assistant".to_string()),
                    content: c.has_content.then_some(c.content),
                    tool_calls: None,
                },
                finish_reason: c.finish_reason,
            })
            .collect();
        Some(ChatCompletionResponse {
            id: self.id?,
            object: "chat.completion".to_string(),
            created: self.created.unwrap_or(0),
            model: self.model?,
            choices,
            usage: self.usage,
            system_fingerprint: self.system_fingerprint,
            cached: None,
        })
    }
}

/// Forward upstream bytes to the client unmodified while reassembling the
/// response on the side. When the `[DONE]` marker arrives, `on_complete`
/// fires with the synthesized full response.
///
/// Dropping the returned stream (client disconnect) drops the upstream
/// stream and the partial reassembly with it; `on_complete` never fires for
/// incomplete streams. Upstream errors propagate verbatim.
pub fn capture_stream<F>(
    upstream: BoxStream<'static, Bytes>,
    on_complete: F,
) -> BoxStream<'static, Bytes>
where
    F: FnOnce(ChatCompletionResponse) + Send + 'static,
{
    struct CaptureState<F> {
        upstream: BoxStream<'static, Bytes>,
        buffer: String,
        assembler: StreamAssembler,
        on_complete: Option<F>,
    }

    let state = CaptureState {
        upstream,
        buffer: String::new(),
        assembler: StreamAssembler::new(),
        on_complete: Some(on_complete),
    };

    let stream = stream::unfold(state, |mut state| async move {
        let item = state.upstream.next().await?;
        if let Ok(bytes) = &item {
            consume_frames(&mut state.buffer, &mut state.assembler, bytes);
            if state.assembler.is_complete() {
                if let Some(callback) = state.on_complete.take() {
                    let assembler = std::mem::take(&mut state.assembler);
                    if let Some(response) = assembler.into_response() {
                        callback(response);
                    }
                }
            }
        }
        Some((item, state))
    });

    Box::pin(stream)
}

/// Append incoming bytes to the frame buffer and feed every complete SSE
/// frame to the assembler. Frames split by `\n\n`, payload after `data: `,
/// `[DONE]` terminal, comment lines ignored.
fn consume_frames(buffer: &mut String, assembler: &mut StreamAssembler, bytes: &Bytes) {
    buffer.push_str(&String::from_utf8_lossy(bytes));
    while let Some(idx) = buffer.find("\n\n") {
        let frame = buffer[..idx].to_string();
        buffer.drain(..idx + 2);
        let trimmed = frame.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') {
            continue;
        }
        let payload = trimmed
            .strip_prefix("data: ")
            .or_else(|| trimmed.strip_prefix("data:"))
            .unwrap_or(trimmed)
            .trim();
        if payload == "[DONE]" {
            assembler.mark_done();
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(payload) {
            assembler.feed(&value);
        }
    }
}
