//! Embedding support for semantic matching.
//!
//! This module provides:
//! - The [`Embedder`] contract the cache engine consumes
//! - A remote OpenAI-compatible embedding client with memoization
//! - A deterministic offline fallback embedder
//! - Vector operations (similarity, normalization)
//!
//! The embedding model's own inference is an external collaborator: the core
//! only requires `embed(text) → vector` with a runtime-invariant dimension
//! and L2-normalized output (the engine re-normalizes on receipt as a
//! safety net). Embeddings are always computed over the **raw** prompt:
//! masking collapses distinct URLs and identifiers into identical tokens,
//! which is exactly the information the semantic signal must keep.

mod client;
mod offline;
pub mod vectors;

pub use client::{RemoteEmbedder, RemoteEmbedderBuilder};
pub use offline::HashingEmbedder;

use async_trait::async_trait;

use crate::Result;

/// Contract for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output dimension; runtime-invariant after start-up.
    fn dim(&self) -> usize;

    /// Whether the embedder can currently serve requests.
    fn ready(&self) -> bool;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embedder_satisfies_contract() {
        let embedder = HashingEmbedder::new(384);
        assert!(embedder.ready());
        assert_eq!(embedder.dim(), 384);
        let v = embedder.embed("hello world").await.unwrap();
        assert_eq!(v.len(), 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
