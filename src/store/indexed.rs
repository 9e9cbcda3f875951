//! Indexed (template) tier contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::entry::CacheEntry;
use crate::fingerprint::RequestMode;
use crate::Result;

/// Model restriction for candidate fetches, derived from the model
/// compatibility policy before the query runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFilter {
    /// Exact model string equality (STRICT).
    Exact(String),
    /// Same family after suffix stripping (FAMILY).
    Family(String),
    /// No model restriction (ANY).
    Any,
}

impl ModelFilter {
    pub fn matches(&self, model: &str, family: &str) -> bool {
        match self {
            ModelFilter::Exact(m) => m == model,
            ModelFilter::Family(f) => f == family,
            ModelFilter::Any => true,
        }
    }
}

/// Parameters of a SimHash candidate fetch.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub tenant: String,
    pub mode: RequestMode,
    pub model: ModelFilter,
    pub simhash: i64,
    /// Maximum Hamming distance admitted into the candidate set.
    pub max_hamming: u32,
    pub limit: usize,
    pub now: DateTime<Utc>,
}

/// Template-tier contract.
///
/// The reference SQL shape this trait abstracts: live-only filter
/// (`expires_at IS NULL OR expires_at > now`), `bit_count(simhash # ?) <= H`
/// ordered by Hamming distance then `hit_count` descending, `LIMIT n`; plus
/// a cosine-ordered fetch against the vector index.
#[async_trait]
pub trait IndexedStore: Send + Sync {
    /// Insert under the best-effort write-through contract: a duplicate
    /// `(tenant, exact_key)` is ignored silently and returns `false`.
    async fn insert(&self, entry: CacheEntry) -> Result<bool>;

    async fn find_by_exact_key(&self, tenant: &str, exact_key: &str)
        -> Result<Option<CacheEntry>>;

    /// SimHash candidate fetch: live entries within the Hamming threshold,
    /// ordered by distance then popularity.
    async fn find_candidates(&self, query: &CandidateQuery) -> Result<Vec<CacheEntry>>;

    /// Cosine-ordered fetch over entries that carry an embedding. The
    /// vector-extension analog of the ANN index scan.
    async fn find_semantic_candidates(
        &self,
        query: &CandidateQuery,
        embedding: &[f32],
    ) -> Result<Vec<CacheEntry>>;

    /// Fire-and-forget hit-stat update; eventual consistency is acceptable.
    async fn record_hit(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Pin or unpin an entry; golden entries never expire by TTL.
    async fn set_golden(&self, id: Uuid, golden: bool) -> Result<bool>;

    /// TTL sweep: delete expired non-golden entries, returning the count.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn clear(&self) -> Result<()>;

    async fn count(&self, tenant: &str) -> Result<u64>;
    async fn count_active(&self, tenant: &str, now: DateTime<Utc>) -> Result<u64>;
    async fn total_hits(&self, tenant: &str) -> Result<u64>;

    fn name(&self) -> &'static str;
}
