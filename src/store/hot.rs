//! Hot (exact) tier: `(tenant, exact_key)` → compressed cached response.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{RequestMode, TemperatureBucket};
use crate::types::response::ChatCompletionResponse;
use crate::{Error, Result};

/// Value stored in the hot tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response: ChatCompletionResponse,
    pub metadata: CacheMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
    pub source_model: String,
    pub mode: RequestMode,
    pub temperature_bucket: TemperatureBucket,
    pub is_golden: bool,
}

impl CachedResponse {
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.metadata.created_at).num_seconds().max(0)
    }
}

/// Exact-match tier contract. Implementations must treat `set` as
/// last-writer-wins; concurrent writers of the same key always carry the
/// same canonical payload.
#[async_trait]
pub trait HotStore: Send + Sync {
    async fn get(&self, tenant: &str, exact_key: &str) -> Result<Option<CachedResponse>>;
    async fn set(
        &self,
        tenant: &str,
        exact_key: &str,
        value: &CachedResponse,
        ttl: Duration,
    ) -> Result<()>;
    async fn delete(&self, tenant: &str, exact_key: &str) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

struct HotEntry {
    compressed: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
    hits: u64,
    last_accessed: Instant,
}

impl HotEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// In-memory hot tier. Values are gzip-compressed JSON; eviction under the
/// entry bound is approximate-LFU (lowest hit count goes first, ties broken
/// by least-recent access).
pub struct MemoryHotStore {
    entries: RwLock<HashMap<String, HotEntry>>,
    max_entries: usize,
}

impl MemoryHotStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    fn key(tenant: &str, exact_key: &str) -> String {
        format!("cache:exact:{}:{}", tenant, exact_key)
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, HotEntry>) {
        entries.retain(|_, e| !e.is_expired());
        while entries.len() >= self.max_entries {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| (e.hits, e.last_accessed))
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

fn compress(value: &CachedResponse) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

fn decompress(data: &[u8]) -> Result<CachedResponse> {
    let mut decoder = GzDecoder::new(data);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| Error::dependency("hot_store", format!("corrupt compressed value: {}", e)))?;
    Ok(serde_json::from_slice(&json)?)
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn get(&self, tenant: &str, exact_key: &str) -> Result<Option<CachedResponse>> {
        let key = Self::key(tenant, exact_key);
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            entries.remove(&key);
            return Ok(None);
        }
        entry.hits += 1;
        entry.last_accessed = Instant::now();
        let mut value = decompress(&entry.compressed)?;
        value.metadata.hit_count = entry.hits;
        Ok(Some(value))
    }

    async fn set(
        &self,
        tenant: &str,
        exact_key: &str,
        value: &CachedResponse,
        ttl: Duration,
    ) -> Result<()> {
        let compressed = compress(value)?;
        let mut entries = self.entries.write();
        self.evict_if_needed(&mut entries);
        let now = Instant::now();
        entries.insert(
            Self::key(tenant, exact_key),
            HotEntry {
                compressed,
                stored_at: now,
                ttl,
                hits: 0,
                last_accessed: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, tenant: &str, exact_key: &str) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .remove(&Self::key(tenant, exact_key))
            .is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| !e.is_expired())
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// No-op hot tier for disabling the exact cache.
pub struct NullHotStore;

#[async_trait]
impl HotStore for NullHotStore {
    async fn get(&self, _: &str, _: &str) -> Result<Option<CachedResponse>> {
        Ok(None)
    }
    async fn set(&self, _: &str, _: &str, _: &CachedResponse, _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &str, _: &str) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(model: &str) -> CachedResponse {
        CachedResponse {
            response: serde_json::from_value(serde_json::json!({
                "id": "chatcmpl-1", "object": "chat.completion", "created": 1,
                "model": model,
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "4"}, "finish_reason": "stop"}]
            }))
            .unwrap(),
            metadata: CacheMetadata {
                created_at: Utc::now(),
                hit_count: 0,
                source_model: model.to_string(),
                mode: RequestMode::Text,
                temperature_bucket: TemperatureBucket::Default,
                is_golden: false,
            },
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_compression() {
        let store = MemoryHotStore::new(16);
        store
            .set("default", "k1", &sample("gpt-4"), Duration::from_secs(60))
            .await
            .unwrap();
        let got = store.get("default", "k1").await.unwrap().unwrap();
        assert_eq!(got.response.first_content(), Some("4"));
        assert_eq!(got.metadata.hit_count, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_vanish() {
        let store = MemoryHotStore::new(16);
        store
            .set("default", "k1", &sample("gpt-4"), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("default", "k1").await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lfu_eviction_keeps_hot_keys() {
        let store = MemoryHotStore::new(2);
        store
            .set("default", "hot", &sample("gpt-4"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("default", "cold", &sample("gpt-4"), Duration::from_secs(60))
            .await
            .unwrap();
        // Touch "hot" a few times so the LFU victim is "cold".
        for _ in 0..3 {
            store.get("default", "hot").await.unwrap();
        }
        store
            .set("default", "new", &sample("gpt-4"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.get("default", "hot").await.unwrap().is_some());
        assert!(store.get("default", "cold").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let store = MemoryHotStore::new(16);
        store
            .set("tenant-a", "k", &sample("gpt-4"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.get("tenant-b", "k").await.unwrap().is_none());
    }
}
