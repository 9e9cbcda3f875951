//! Persisted cache entry row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::fingerprint::{RequestMode, TemperatureBucket};
use crate::types::response::ChatCompletionResponse;
use crate::Result;

/// One row of the template tier. Stores a cached response together with the
/// matching metadata the lookup path filters and scores on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: Uuid,
    pub tenant: String,

    // Keys
    pub exact_key: String,
    pub simhash: i64,
    /// L2-normalized embedding of the raw prompt; absent when the embedder
    /// was degraded at write time.
    pub embedding: Option<Vec<f32>>,

    // Content
    /// Masked template form of the prompt.
    pub canonical_prompt: String,
    /// Digest of the raw prompt (keyed when a secret is configured).
    pub raw_prompt_hmac: String,
    pub request_blob: Value,
    pub response_blob: Value,

    // Metadata
    pub model: String,
    pub temperature_bucket: TemperatureBucket,
    pub mode: RequestMode,
    pub tool_schema_hash: String,

    // Stats
    pub hit_count: u64,
    pub last_hit_at: Option<DateTime<Utc>>,

    // Flags
    pub is_golden: bool,
    pub pii_present: bool,

    // Timestamps
    pub created_at: DateTime<Utc>,
    /// `None` for golden entries, which never expire by TTL.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Golden entries never expire; otherwise the TTL governs.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.is_golden {
            return false;
        }
        matches!(self.expires_at, Some(at) if at < now)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }

    pub fn record_hit(&mut self, now: DateTime<Utc>) {
        self.hit_count += 1;
        self.last_hit_at = Some(now);
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }

    /// Deserialize the stored response blob.
    pub fn response(&self) -> Result<ChatCompletionResponse> {
        Ok(serde_json::from_value(self.response_blob.clone())?)
    }

    /// Promote to golden: pinned, exempt from TTL eviction.
    pub fn promote_golden(&mut self) {
        self.is_golden = true;
        self.expires_at = None;
    }
}
