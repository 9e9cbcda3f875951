//! Composite scoring for template-aware cache matching.
//!
//! Combines four signals:
//! - Semantic similarity (embedding cosine), the primary signal
//! - Structural similarity (SimHash Hamming distance)
//! - Parameter closeness (temperature bucket, top_p)
//! - Recency (exponential time decay)
//!
//! ```text
//! composite = 0.6·semantic + 0.2·structural + 0.1·param + 0.1·recency
//! ```

use chrono::{DateTime, Utc};

use crate::embeddings::vectors;
use crate::fingerprint::{simhash, Fingerprint, TemperatureBucket};
use crate::store::CacheEntry;

const WEIGHT_SEMANTIC: f64 = 0.6;
const WEIGHT_STRUCTURAL: f64 = 0.2;
const WEIGHT_PARAM: f64 = 0.1;
const WEIGHT_RECENCY: f64 = 0.1;

/// Half-life of the recency signal, in hours (one week).
const RECENCY_HALF_LIFE_HOURS: f64 = 168.0;

/// Per-signal breakdown of a candidate score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub structural: f64,
    pub semantic: Option<f64>,
    pub param: f64,
    pub recency: f64,
    pub composite: f64,
}

/// A candidate paired with its score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub entry: CacheEntry,
    pub score: ScoreBreakdown,
}

/// Composite scorer. `top_p` of the incoming request rides in separately
/// because it is not part of the fingerprint.
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer;

impl CompositeScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one candidate against the request fingerprint.
    ///
    /// When either side lacks an embedding the semantic term is dropped and
    /// the remaining weights are renormalized; callers are expected to raise
    /// the admission threshold in that degraded configuration.
    pub fn score(
        &self,
        fingerprint: &Fingerprint,
        request_top_p: Option<f64>,
        candidate: &CacheEntry,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let structural = structural_score(fingerprint.simhash, candidate.simhash);
        let semantic = match (&fingerprint.embedding, &candidate.embedding) {
            (Some(a), Some(b)) => semantic_score(a, b),
            _ => None,
        };
        let cached_top_p = candidate.request_blob.get("top_p").and_then(|v| v.as_f64());
        let param = param_score(
            fingerprint.temperature_bucket,
            candidate.temperature_bucket,
            request_top_p,
            cached_top_p,
        );
        let recency = recency_score(candidate.created_at, now);

        let composite = match semantic {
            Some(sem) => {
                WEIGHT_SEMANTIC * sem
                    + WEIGHT_STRUCTURAL * structural
                    + WEIGHT_PARAM * param
                    + WEIGHT_RECENCY * recency
            }
            None => {
                // Semantic signal unavailable: renormalize the remaining
                // weights so the scale of the composite stays comparable.
                let remaining = WEIGHT_STRUCTURAL + WEIGHT_PARAM + WEIGHT_RECENCY;
                (WEIGHT_STRUCTURAL * structural + WEIGHT_PARAM * param + WEIGHT_RECENCY * recency)
                    / remaining
            }
        };

        ScoreBreakdown {
            structural,
            semantic,
            param,
            recency,
            composite,
        }
    }

    /// Score all candidates, keep those at or above the threshold, best
    /// first. Ties break on recency, then hit count.
    pub fn rank(
        &self,
        fingerprint: &Fingerprint,
        request_top_p: Option<f64>,
        candidates: Vec<CacheEntry>,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|entry| {
                let score = self.score(fingerprint, request_top_p, &entry, now);
                ScoredCandidate { entry, score }
            })
            .filter(|sc| sc.score.composite >= threshold)
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .composite
                .partial_cmp(&a.score.composite)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.entry.created_at.cmp(&a.entry.created_at))
                .then(b.entry.hit_count.cmp(&a.entry.hit_count))
        });
        scored
    }

    /// Best surviving candidate, if any.
    pub fn find_best(
        &self,
        fingerprint: &Fingerprint,
        request_top_p: Option<f64>,
        candidates: Vec<CacheEntry>,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Option<ScoredCandidate> {
        self.rank(fingerprint, request_top_p, candidates, threshold, now)
            .into_iter()
            .next()
    }
}

/// Lower Hamming distance ⇒ higher similarity: 1 − distance/64.
fn structural_score(a: i64, b: i64) -> f64 {
    1.0 - (simhash::hamming(a, b) as f64 / 64.0)
}

/// Cosine similarity mapped from [−1, 1] to [0, 1].
fn semantic_score(a: &[f32], b: &[f32]) -> Option<f64> {
    let cos = vectors::cosine_similarity(a, b).ok()?;
    Some((cos as f64 + 1.0) / 2.0)
}

fn param_score(
    request_bucket: TemperatureBucket,
    cached_bucket: TemperatureBucket,
    request_top_p: Option<f64>,
    cached_top_p: Option<f64>,
) -> f64 {
    (temperature_closeness(request_bucket, cached_bucket)
        + top_p_closeness(request_top_p, cached_top_p))
        / 2.0
}

/// Exact bucket match 1.0, adjacent buckets 0.5, otherwise 0.0.
fn temperature_closeness(request: TemperatureBucket, cached: TemperatureBucket) -> f64 {
    if request == cached {
        1.0
    } else if request.is_adjacent(&cached) {
        0.5
    } else {
        0.0
    }
}

/// Both sides at the default → 1.0; equal within 1e-2 → 1.0; otherwise 0.8.
/// The cached side's top_p lives in its stored request blob (absent means
/// the default, which canonicalization dropped).
fn top_p_closeness(request_top_p: Option<f64>, cached_top_p: Option<f64>) -> f64 {
    let a = request_top_p.unwrap_or(1.0);
    let b = cached_top_p.unwrap_or(1.0);
    let both_default = (a - 1.0).abs() < 0.01 && (b - 1.0).abs() < 0.01;
    if both_default || (a - b).abs() <= 0.01 {
        1.0
    } else {
        0.8
    }
}

/// Exponential decay with a one-week half-life.
fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - created_at).num_seconds().max(0) as f64 / 3600.0;
    (-age_hours / RECENCY_HALF_LIFE_HOURS).exp()
}
