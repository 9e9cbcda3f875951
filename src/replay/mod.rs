//! 流重放模块：确定性分块重放与透传捕获。
//!
//! # Stream Replay Module
//!
//! Two jobs, one per lookup outcome:
//!
//! - **Hit replay** ([`StreamReplayer`]): a cached full response is split
//!   into word-boundary chunks whose sizes and inter-chunk delays are drawn
//!   from a PRNG seeded by the cache key. Two replays of the same entry
//!   produce byte-identical event sequences, yet pacing resembles live
//!   token generation.
//! - **Miss passthrough** ([`capture_stream`]): upstream bytes are forwarded
//!   unmodified while an incremental SSE reassembler rebuilds the full
//!   response; the terminal `[DONE]` marker triggers the write-through
//!   callback. A dropped stream discards the partial reassembly; cancelled
//!   misses never produce cache entries.

mod chunker;
mod passthrough;
mod replayer;

pub use chunker::{seed_from_key, DeterministicChunker, PacedChunk};
pub use passthrough::{capture_stream, StreamAssembler};
pub use replayer::StreamReplayer;
