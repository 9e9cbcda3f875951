//! Seeded word-boundary chunking.

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use sha2::{Digest, Sha256};

/// First 64 bits of SHA-256 over the cache key. Stable across processes and
/// releases, so the same entry always chunks the same way.
pub fn seed_from_key(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// One planned emission: the text slice and the pause before sending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacedChunk {
    pub text: String,
    pub delay: Duration,
}

/// Splits response content into chunks by walking word boundaries, sizes and
/// delays drawn from Gaussians on a key-seeded ChaCha stream.
///
/// ChaCha8 is used deliberately: its output is specified and stable across
/// `rand` releases, which the replay determinism property depends on.
#[derive(Debug, Clone)]
pub struct DeterministicChunker {
    mean_words: f64,
    std_dev_words: f64,
    delay_mean_ms: f64,
    delay_std_ms: f64,
}

impl Default for DeterministicChunker {
    fn default() -> Self {
        Self {
            mean_words: 15.0,
            std_dev_words: 5.0,
            delay_mean_ms: 50.0,
            delay_std_ms: 20.0,
        }
    }
}

impl DeterministicChunker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pacing(mut self, mean_ms: f64, std_ms: f64) -> Self {
        self.delay_mean_ms = mean_ms;
        self.delay_std_ms = std_ms;
        self
    }

    /// Plan the chunk sequence for `content` under `key`. Cache hits halve
    /// the pacing: the answer is already paid for.
    pub fn plan(&self, content: &str, key: &str, cache_hit: bool) -> Vec<PacedChunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed_from_key(key));
        let size_dist = Normal::new(self.mean_words, self.std_dev_words)
            .expect("static distribution parameters");
        let delay_mean = if cache_hit {
            self.delay_mean_ms / 2.0
        } else {
            self.delay_mean_ms
        };
        let delay_dist =
            Normal::new(delay_mean, self.delay_std_ms).expect("static distribution parameters");

        let words = split_word_segments(content);
        let mut chunks = Vec::new();
        let mut pos = 0;
        while pos < words.len() {
            let take = (size_dist.sample(&mut rng).round() as i64).max(1) as usize;
            let end = (pos + take).min(words.len());
            let text: String = words[pos..end].concat();
            // Delays ride the same seeded stream so the whole plan is a pure
            // function of the key.
            let delay_ms = delay_dist.sample(&mut rng).max(0.0);
            chunks.push(PacedChunk {
                text,
                delay: Duration::from_millis(delay_ms as u64),
            });
            pos = end;
        }
        chunks
    }
}

/// Split into word segments, each word keeping its trailing whitespace, so
/// concatenating all segments reproduces the input byte-for-byte.
fn split_word_segments(content: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_whitespace = content
        .chars()
        .next()
        .map(char::is_whitespace)
        .unwrap_or(false);
    for (i, c) in content.char_indices().skip(1) {
        let ws = c.is_whitespace();
        if in_whitespace && !ws {
            segments.push(&content[start..i]);
            start = i;
        }
        in_whitespace = ws;
    }
    segments.push(&content[start..]);
    segments
}
