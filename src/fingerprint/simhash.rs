//! 64-bit SimHash structural fingerprints.
//!
//! Similar texts produce similar fingerprints (low Hamming distance).
//!
//! Algorithm:
//! 1. Tokenize text (words + character trigrams)
//! 2. Hash each token to a 64-bit value (MurmurHash3 variant)
//! 3. Accumulate each bit weighted by token importance
//! 4. Fingerprint bit i is 1 iff accumulator\[i\] > 0

use std::collections::HashMap;
use std::time::Instant;

const HASH_BITS: usize = 64;
const NGRAM_SIZE: usize = 3;
const LATENCY_BUDGET_MS: u128 = 5;

/// Common stop words, downweighted so function words do not dominate the
/// fingerprint.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "be", "been", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can", "this", "that", "these", "those",
];

/// Generate a 64-bit SimHash fingerprint for text.
///
/// Returned as `i64` to match the persisted column type; Hamming math runs
/// on the bit pattern.
pub fn generate(text: &str) -> i64 {
    if text.is_empty() {
        return 0;
    }

    let start = Instant::now();

    let normalized = normalize(text);
    let tokens = tokenize(&normalized);
    let fingerprint = compute_fingerprint(&tokens);

    let elapsed_ms = start.elapsed().as_millis();
    if elapsed_ms > LATENCY_BUDGET_MS {
        tracing::warn!(
            elapsed_ms,
            chars = text.len(),
            "SimHash generation exceeded latency budget"
        );
    }

    fingerprint as i64
}

/// Hamming distance: the number of differing bits.
pub fn hamming(a: i64, b: i64) -> u32 {
    ((a as u64) ^ (b as u64)).count_ones()
}

/// Whether two hashes are within a Hamming threshold.
pub fn is_similar(a: i64, b: i64, threshold: u32) -> bool {
    hamming(a, b) <= threshold
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word tokens plus character trigrams of the normalized text.
fn tokenize(text: &str) -> HashMap<&str, i64> {
    let mut tokens: HashMap<&str, i64> = HashMap::new();

    for word in text.split_whitespace() {
        if word.chars().count() < 2 {
            continue;
        }
        *tokens.entry(word).or_insert(0) += token_weight(word);
    }

    // Trigrams keep nearby fingerprints close across typos.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    if boundaries.len() > NGRAM_SIZE {
        for w in boundaries.windows(NGRAM_SIZE + 1) {
            let ngram = &text[w[0]..w[NGRAM_SIZE]];
            *tokens.entry(ngram).or_insert(0) += 1;
        }
    }

    tokens
}

fn token_weight(token: &str) -> i64 {
    let mut weight = 10;
    if STOP_WORDS.contains(&token) {
        weight = 2;
    }
    if token.chars().count() > 8 {
        weight += 5;
    }
    if token.chars().any(|c| c.is_ascii_digit() || c == '_' || c == '-') {
        weight += 3;
    }
    weight
}

fn compute_fingerprint(tokens: &HashMap<&str, i64>) -> u64 {
    let mut bit_vector = [0i64; HASH_BITS];

    for (token, weight) in tokens {
        let hash = murmur64(token.as_bytes());
        for (i, acc) in bit_vector.iter_mut().enumerate() {
            if hash & (1u64 << i) != 0 {
                *acc += weight;
            } else {
                *acc -= weight;
            }
        }
    }

    let mut fingerprint = 0u64;
    for (i, acc) in bit_vector.iter().enumerate() {
        if *acc > 0 {
            fingerprint |= 1u64 << i;
        }
    }
    fingerprint
}

/// MurmurHash3 64-bit variant: fast, good dispersion, non-cryptographic.
fn murmur64(data: &[u8]) -> u64 {
    const SEED: u64 = 0x1234_5678_90AB_CDEF;
    const C1: u64 = 0x87c3_7b91_1142_53d5;
    const C2: u64 = 0x4cf5_ad43_2745_937f;

    let mut h1 = SEED;
    let mut h2 = SEED;

    let length = data.len();
    let nblocks = length / 16;

    for i in 0..nblocks {
        let idx = i * 16;
        let mut k1 = read_u64(data, idx);
        let mut k2 = read_u64(data, idx + 8);

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1 = 0u64;
    let mut k2 = 0u64;
    for (i, byte) in tail.iter().enumerate() {
        let b = *byte as u64;
        if i < 8 {
            k1 ^= b << (8 * i);
        } else {
            k2 ^= b << (8 * (i - 8));
        }
    }
    if !tail.is_empty() {
        if tail.len() > 8 {
            k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
            h2 ^= k2;
        }
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= length as u64;
    h2 ^= length as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1.wrapping_add(h2)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}
