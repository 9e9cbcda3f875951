//! In-memory template tier.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::entry::CacheEntry;
use super::indexed::{CandidateQuery, IndexedStore};
use crate::embeddings::vectors;
use crate::fingerprint::{model_family, simhash};
use crate::Result;

/// In-process implementation of [`IndexedStore`]. A linear scan with the
/// same filtering and ordering semantics the relational/vector-extension
/// tier provides; at in-process scale the scan beats index maintenance.
pub struct MemoryIndexedStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Uuid, CacheEntry>,
    exact_keys: HashSet<(String, String)>,
}

impl MemoryIndexedStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn live_matches(inner: &Inner, query: &CandidateQuery) -> Vec<CacheEntry> {
        inner
            .entries
            .values()
            .filter(|e| e.tenant == query.tenant)
            .filter(|e| e.mode == query.mode)
            .filter(|e| query.model.matches(&e.model, &model_family(&e.model)))
            .filter(|e| e.is_live(query.now))
            .cloned()
            .collect()
    }
}

impl Default for MemoryIndexedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexedStore for MemoryIndexedStore {
    async fn insert(&self, entry: CacheEntry) -> Result<bool> {
        let mut inner = self.inner.write();
        let key = (entry.tenant.clone(), entry.exact_key.clone());
        if inner.exact_keys.contains(&key) {
            // Duplicate write-through from a concurrent miss; first writer wins.
            return Ok(false);
        }
        inner.exact_keys.insert(key);
        inner.entries.insert(entry.id, entry);
        Ok(true)
    }

    async fn find_by_exact_key(
        &self,
        tenant: &str,
        exact_key: &str,
    ) -> Result<Option<CacheEntry>> {
        let inner = self.inner.read();
        Ok(inner
            .entries
            .values()
            .find(|e| e.tenant == tenant && e.exact_key == exact_key)
            .cloned())
    }

    async fn find_candidates(&self, query: &CandidateQuery) -> Result<Vec<CacheEntry>> {
        let inner = self.inner.read();
        let mut matches: Vec<(u32, CacheEntry)> = Self::live_matches(&inner, query)
            .into_iter()
            .filter_map(|e| {
                let distance = simhash::hamming(e.simhash, query.simhash);
                (distance <= query.max_hamming).then_some((distance, e))
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.hit_count.cmp(&a.1.hit_count)));
        matches.truncate(query.limit);
        Ok(matches.into_iter().map(|(_, e)| e).collect())
    }

    async fn find_semantic_candidates(
        &self,
        query: &CandidateQuery,
        embedding: &[f32],
    ) -> Result<Vec<CacheEntry>> {
        let inner = self.inner.read();
        let mut matches: Vec<(f32, CacheEntry)> = Self::live_matches(&inner, query)
            .into_iter()
            .filter_map(|e| {
                let cos = e
                    .embedding
                    .as_ref()
                    .and_then(|emb| vectors::cosine_similarity(emb, embedding).ok())?;
                Some((cos, e))
            })
            .collect();
        matches.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(query.limit);
        Ok(matches.into_iter().map(|(_, e)| e).collect())
    }

    async fn record_hit(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry.record_hit(now);
        }
        Ok(())
    }

    async fn set_golden(&self, id: Uuid, golden: bool) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(&id) {
            Some(entry) => {
                if golden {
                    entry.promote_golden();
                } else {
                    entry.is_golden = false;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.write();
        let expired: Vec<Uuid> = inner
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.id)
            .collect();
        for id in &expired {
            if let Some(entry) = inner.entries.remove(id) {
                inner.exact_keys.remove(&(entry.tenant, entry.exact_key));
            }
        }
        Ok(expired.len())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.entries.remove(&id) {
            Some(entry) => {
                inner.exact_keys.remove(&(entry.tenant, entry.exact_key));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.exact_keys.clear();
        Ok(())
    }

    async fn count(&self, tenant: &str) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .entries
            .values()
            .filter(|e| e.tenant == tenant)
            .count() as u64)
    }

    async fn count_active(&self, tenant: &str, now: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .entries
            .values()
            .filter(|e| e.tenant == tenant && e.is_live(now))
            .count() as u64)
    }

    async fn total_hits(&self, tenant: &str) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .entries
            .values()
            .filter(|e| e.tenant == tenant)
            .map(|e| e.hit_count)
            .sum())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
