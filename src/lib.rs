//! # ai-cache-proxy
//!
//! Core cache engine for an OpenAI-compatible caching proxy: a two-tier,
//! template-aware cache that serves semantically equivalent prior answers
//! instead of re-invoking the upstream model.
//!
//! The pipeline on every request is: canonicalize → fingerprint → two-tier
//! lookup (exact, then template) → guardrails → composite scoring → either a
//! deterministic stream replay (hit) or an upstream forward with asynchronous
//! write-through (miss). Ingress frameworks, provider wire conversions beyond
//! the OpenAI-compatible surface, and the embedding model's own inference are
//! external collaborators behind the seams in [`store`], [`provider`] and
//! [`embeddings`].

pub mod canonical;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod fingerprint;
pub mod provider;
pub mod proxy;
pub mod replay;
pub mod resilience;
pub mod scoring;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{CacheSettings, ProxyConfig};
pub use engine::control::{CacheControl, CacheLookupMode, ModelCompatPolicy};
pub use engine::{CacheEngine, CacheHit, CacheStatistics, MatchType};
pub use proxy::{ProxyResponse, ProxyService, ProxyStream};
pub use types::{
    chunk::{ChatCompletionChunk, Delta},
    request::{ChatCompletionRequest, Message, MessageRole},
    response::ChatCompletionResponse,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits Result<T>
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
