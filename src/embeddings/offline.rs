//! Deterministic offline embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{vectors, Embedder};
use crate::Result;

/// Feature-hashing embedder: character trigrams of the lowercased text are
/// hashed into a fixed-dimension bag, then L2-normalized.
///
/// This is **not** a semantic model (paraphrases do not land near each
/// other), but it is deterministic, dependency-free and keeps the exact
/// self-match property (identical text → identical vector), which is enough
/// for degraded operation and for tests that only need vector plumbing.
/// Production deployments should inject a real model behind
/// [`Embedder`]; relying on character-level features where sub-word
/// semantics are needed produces meaningless similarity scores.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "embedding dimension must be positive");
        Self { dim }
    }

    fn features(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0f32; self.dim];
        let normalized = text.to_lowercase();
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() < 3 {
            // Degenerate inputs still hash the whole string once.
            bump(&mut acc, normalized.as_bytes());
            return acc;
        }
        for window in chars.windows(3) {
            let gram: String = window.iter().collect();
            bump(&mut acc, gram.as_bytes());
        }
        acc
    }
}

fn bump(acc: &mut [f32], data: &[u8]) {
    let digest = Sha256::digest(data);
    let mut idx_bytes = [0u8; 8];
    idx_bytes.copy_from_slice(&digest[..8]);
    let slot = (u64::from_le_bytes(idx_bytes) % acc.len() as u64) as usize;
    // Second half of the digest picks the sign so buckets cancel rather
    // than all piling positive.
    let sign = if digest[31] & 1 == 0 { 1.0 } else { -1.0 };
    acc[slot] += sign;
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vectors::normalize_vector(&self.features(text)))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn ready(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}
