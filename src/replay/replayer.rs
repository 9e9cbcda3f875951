//! Deterministic SSE replay of cached responses.

use std::time::Duration;

use futures::stream;

use super::chunker::DeterministicChunker;
use crate::types::chunk::ChatCompletionChunk;
use crate::types::response::ChatCompletionResponse;
use crate::{BoxStream, Result};

/// Terminal SSE frame.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Replays a cached full response as an SSE chunk sequence.
///
/// The frame payloads are a pure function of `(response, cache_key)`: two
/// replays of the same entry emit byte-identical `data:` frames. The
/// inter-chunk sleeps come from the same seeded stream, so even pacing is
/// reproducible up to scheduler jitter.
pub struct StreamReplayer {
    chunker: DeterministicChunker,
}

impl StreamReplayer {
    pub fn new() -> Self {
        Self {
            chunker: DeterministicChunker::new(),
        }
    }

    pub fn with_chunker(chunker: DeterministicChunker) -> Self {
        Self { chunker }
    }

    /// Build the full frame plan without pacing. Exposed for tests and for
    /// callers that do their own scheduling.
    pub fn plan_frames(
        &self,
        response: &ChatCompletionResponse,
        cache_key: &str,
        cache_hit: bool,
    ) -> Result<Vec<(String, Duration)>> {
        let mut frames: Vec<(String, Duration)> = Vec::new();

        if response.choices.is_empty() {
            frames.push((sse_frame(&ChatCompletionChunk::finish(response, 0, "stop"))?, Duration::ZERO));
            frames.push((DONE_FRAME.to_string(), Duration::ZERO));
            return Ok(frames);
        }

        for choice in &response.choices {
            let index = choice.index;
            // Role rides in the first delta of the first choice.
            if index == 0 {
                frames.push((
                    sse_frame(&ChatCompletionChunk::role(
                        response,
                        index,
                        choice.message.role.clone(),
                    ))?,
                    Duration::ZERO,
                ));
            }

            let content = choice.message.content.as_deref().unwrap_or("");
            for paced in self.chunker.plan(content, cache_key, cache_hit) {
                frames.push((
                    sse_frame(&ChatCompletionChunk::content(response, index, paced.text))?,
                    paced.delay,
                ));
            }

            let finish = choice.finish_reason.as_deref().unwrap_or("stop");
            frames.push((
                sse_frame(&ChatCompletionChunk::finish(response, index, finish))?,
                Duration::ZERO,
            ));
        }

        frames.push((DONE_FRAME.to_string(), Duration::ZERO));
        Ok(frames)
    }

    /// Replay as a paced SSE frame stream. Dropping the stream cancels all
    /// remaining sleeps and emissions.
    pub fn replay(
        &self,
        response: &ChatCompletionResponse,
        cache_key: &str,
        cache_hit: bool,
    ) -> Result<BoxStream<'static, String>> {
        let frames = self.plan_frames(response, cache_key, cache_hit)?;
        let stream = stream::unfold(frames.into_iter(), |mut frames| async move {
            let (frame, delay) = frames.next()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((Ok(frame), frames))
        });
        Ok(Box::pin(stream))
    }
}

impl Default for StreamReplayer {
    fn default() -> Self {
        Self::new()
    }
}

fn sse_frame(chunk: &ChatCompletionChunk) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?))
}
