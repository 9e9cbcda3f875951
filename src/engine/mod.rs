//! 缓存引擎模块：双层查找与异步写入。
//!
//! # Cache Engine Module
//!
//! Owns the two stores and drives the lookup and write-through algorithms.
//!
//! ## Lookup path
//!
//! ```text
//! request ──► fingerprint ──► hot tier (exact) ──hit──► score 1.0
//!                   │
//!                 miss
//!                   ▼
//!           indexed tier (SimHash candidates ≤ H)
//!                   │ guardrails (mode, tools, model, schema, expiry)
//!                   ▼
//!           composite scoring ≥ τ ──► best candidate, hit stats async
//! ```
//!
//! Exact lookup strictly precedes template lookup; guardrails strictly
//! precede scoring. Every store and embedder round-trip runs under its
//! per-dependency timeout and circuit breaker, so a dead dependency costs
//! one failed call, not a hung request.

pub mod control;
pub mod headers;

pub use headers::Provenance;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{CacheSettings, TimeoutSettings};
use crate::embeddings::Embedder;
use crate::engine::control::{CacheControl, ModelCompatPolicy};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::resilience::{CircuitBreaker, DegradationMode, DependencyBreakers};
use crate::scoring::{CompositeScorer, Guardrails};
use crate::store::{
    CacheEntry, CacheMetadata, CachedResponse, CandidateQuery, HotStore, IndexedStore, ModelFilter,
};
use crate::types::request::ChatCompletionRequest;
use crate::types::response::ChatCompletionResponse;
use crate::{Error, Result};

/// How a cached response was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Template,
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Template => "template",
            MatchType::None => "none",
        }
    }
}

/// A served cache hit with its provenance.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response: ChatCompletionResponse,
    pub match_type: MatchType,
    pub score: f64,
    /// Template-tier entry id; exact hits have no row id.
    pub entry_id: Option<Uuid>,
    pub source_model: String,
    pub created_at: DateTime<Utc>,
    pub age_seconds: i64,
}

impl CacheHit {
    pub fn provenance(&self, degradation: DegradationMode) -> Provenance {
        Provenance {
            hit: true,
            match_type: self.match_type,
            score: self.score,
            entry_id: self.entry_id.map(|id| id.to_string()),
            source_model: Some(self.source_model.clone()),
            age_seconds: Some(self.age_seconds),
            degraded: degradation.is_degraded(),
            degraded_reason: degradation.reason(),
        }
    }
}

/// Operational counters and store sizes for `GET /v1/cache/stats`.
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub exact_entries: u64,
    pub template_entries: u64,
    pub active_entries: u64,
    pub total_entry_hits: u64,
    pub lookups: u64,
    pub exact_hits: u64,
    pub template_hits: u64,
    pub misses: u64,
    pub write_failures: u64,
}

impl CacheStatistics {
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.exact_hits + self.template_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    lookups: AtomicU64,
    exact_hits: AtomicU64,
    template_hits: AtomicU64,
    misses: AtomicU64,
    write_failures: AtomicU64,
}

/// Two-tier, template-aware cache engine.
pub struct CacheEngine {
    config: CacheSettings,
    timeouts: TimeoutSettings,
    hot: Arc<dyn HotStore>,
    indexed: Arc<dyn IndexedStore>,
    embedder: Arc<dyn Embedder>,
    breakers: Arc<DependencyBreakers>,
    fingerprinter: Fingerprinter,
    scorer: CompositeScorer,
    guardrails: Guardrails,
    counters: Counters,
}

impl CacheEngine {
    pub fn new(
        config: CacheSettings,
        timeouts: TimeoutSettings,
        hot: Arc<dyn HotStore>,
        indexed: Arc<dyn IndexedStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let fingerprinter = Fingerprinter::with_masker(crate::canonical::PromptMasker::with_secret(
            config.digest_secret.clone(),
        ));
        Self {
            config,
            timeouts,
            hot,
            indexed,
            embedder,
            breakers: Arc::new(DependencyBreakers::new()),
            fingerprinter,
            scorer: CompositeScorer::new(),
            guardrails: Guardrails::new(),
            counters: Counters::default(),
        }
    }

    pub fn breakers(&self) -> Arc<DependencyBreakers> {
        Arc::clone(&self.breakers)
    }

    pub fn degradation(&self) -> DegradationMode {
        self.breakers.degradation()
    }

    pub fn config(&self) -> &CacheSettings {
        &self.config
    }

    /// Fingerprint a request without touching any store. Pure CPU.
    pub fn fingerprint(&self, request: &ChatCompletionRequest) -> Result<Fingerprint> {
        self.fingerprinter.fingerprint(request)
    }

    /// Two-tier lookup. Returns `Ok(None)` on a miss; dependency failures
    /// degrade to a miss rather than surfacing.
    pub async fn lookup(
        &self,
        request: &ChatCompletionRequest,
        control: &CacheControl,
    ) -> Result<Option<CacheHit>> {
        if !self.config.enabled || !control.should_lookup() {
            return Ok(None);
        }
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let fingerprint = self.fingerprinter.fingerprint(request)?;

        if control.use_exact() {
            if let Some(hit) = self.exact_lookup(&fingerprint).await {
                self.counters.exact_hits.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    latency_ms = started.elapsed().as_millis() as u64,
                    exact_key = %fingerprint.exact_key,
                    "cache hit (exact)"
                );
                return Ok(Some(hit));
            }
        }

        if self.config.template_matching && control.use_template() {
            if let Some(hit) = self.template_lookup(request, &fingerprint, control).await {
                self.counters.template_hits.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    latency_ms = started.elapsed().as_millis() as u64,
                    score = hit.score,
                    "cache hit (template)"
                );
                return Ok(Some(hit));
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            latency_ms = started.elapsed().as_millis() as u64,
            "cache miss"
        );
        Ok(None)
    }

    async fn exact_lookup(&self, fingerprint: &Fingerprint) -> Option<CacheHit> {
        if !self.breakers.hot.allow() {
            return None;
        }
        let result = timed(
            &self.breakers.hot,
            self.timeouts.hot_store,
            "hot_store",
            self.hot.get(&self.config.tenant, &fingerprint.exact_key),
        )
        .await;

        let cached = match result {
            Ok(found) => found?,
            Err(e) => {
                tracing::warn!(error = %e, "hot tier lookup failed, degrading");
                return None;
            }
        };

        // Defense in depth: the hot tier owns TTL, but a stale value must
        // still never be served.
        let now = Utc::now();
        let ttl = self.ttl_for_model(&cached.metadata.source_model);
        if !cached.metadata.is_golden && cached.age_seconds(now) as u64 > ttl.as_secs() {
            return None;
        }

        Some(CacheHit {
            age_seconds: cached.age_seconds(now),
            created_at: cached.metadata.created_at,
            source_model: cached.metadata.source_model.clone(),
            response: cached.response,
            match_type: MatchType::Exact,
            score: 1.0,
            entry_id: None,
        })
    }

    async fn template_lookup(
        &self,
        request: &ChatCompletionRequest,
        fingerprint: &Fingerprint,
        control: &CacheControl,
    ) -> Option<CacheHit> {
        if !self.breakers.indexed.allow() {
            return None;
        }

        let mut fingerprint = fingerprint.clone();
        fingerprint.embedding = self.try_embed(&fingerprint.prompt_text).await;

        // Without the semantic signal the admission bar rises.
        let threshold = self.config.similarity_threshold
            + if fingerprint.embedding.is_none() {
                DegradationMode::TemplateWithoutSemantic.threshold_adjustment()
            } else {
                0.0
            };

        let now = Utc::now();
        let query = CandidateQuery {
            tenant: self.config.tenant.clone(),
            mode: fingerprint.mode,
            model: model_filter(control.model_compat, &fingerprint),
            simhash: fingerprint.simhash,
            max_hamming: self.config.hamming_threshold,
            limit: self.config.candidate_limit,
            now,
        };

        let candidates = match timed(
            &self.breakers.indexed,
            self.timeouts.indexed_store,
            "indexed_store",
            self.indexed.find_candidates(&query),
        )
        .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "indexed tier lookup failed, degrading");
                return None;
            }
        };
        if candidates.is_empty() {
            return None;
        }
        tracing::debug!(count = candidates.len(), "scoring SimHash candidates");

        let schema = request
            .response_format
            .as_ref()
            .and_then(|f| f.json_schema.as_ref());
        let admitted: Vec<CacheEntry> = candidates
            .into_iter()
            .filter(|candidate| {
                match self.guardrails.check(
                    &fingerprint,
                    candidate,
                    control.model_compat,
                    schema,
                    now,
                ) {
                    Ok(()) => true,
                    Err(reason) => {
                        tracing::debug!(
                            entry = %candidate.id,
                            reason = reason.as_str(),
                            "candidate rejected by guardrail"
                        );
                        false
                    }
                }
            })
            .collect();

        let best = self
            .scorer
            .find_best(&fingerprint, request.top_p, admitted, threshold, now)?;
        let entry = best.entry;
        let response = match entry.response() {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(entry = %entry.id, error = %e, "cached response blob corrupt");
                return None;
            }
        };

        // Fire-and-forget stat update; failure is logged, never surfaced.
        let indexed = Arc::clone(&self.indexed);
        let entry_id = entry.id;
        tokio::spawn(async move {
            if let Err(e) = indexed.record_hit(entry_id, Utc::now()).await {
                tracing::warn!(entry = %entry_id, error = %e, "hit-stat update failed");
            }
        });

        Some(CacheHit {
            age_seconds: entry.age_seconds(now),
            created_at: entry.created_at,
            source_model: entry.model.clone(),
            response,
            match_type: MatchType::Template,
            score: best.score.composite,
            entry_id: Some(entry.id),
        })
    }

    /// Best-effort embedding over the raw prompt. Failures degrade the
    /// semantic signal away instead of failing the lookup.
    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        if !self.embedder.ready() || !self.breakers.embedder.allow() {
            return None;
        }
        match timed(
            &self.breakers.embedder,
            self.timeouts.embedder,
            "embedder",
            self.embedder.embed(text),
        )
        .await
        {
            Ok(vector) => Some(crate::embeddings::vectors::normalize_vector(&vector)),
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, structural matching only");
                None
            }
        }
    }

    /// Write-through after an upstream success. Both tiers are written under
    /// a best-effort contract; callers wanting fire-and-forget semantics
    /// spawn this future.
    pub async fn store(
        &self,
        request: &ChatCompletionRequest,
        response: &ChatCompletionResponse,
        control: &CacheControl,
    ) {
        if !self.config.enabled || !control.store {
            return;
        }
        let fingerprint = match self.fingerprinter.fingerprint(request) {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!(error = %e, "fingerprint failed, skipping write-through");
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let embedding = self.try_embed(&fingerprint.prompt_text).await;
        let now = Utc::now();
        let ttl = self.config.ttl_for_family(&fingerprint.model_family);

        self.store_hot(&fingerprint, response, now, ttl).await;
        self.store_indexed(&fingerprint, embedding, request, response, now, ttl)
            .await;
    }

    async fn store_hot(
        &self,
        fingerprint: &Fingerprint,
        response: &ChatCompletionResponse,
        now: DateTime<Utc>,
        ttl: Duration,
    ) {
        if !self.breakers.hot.allow() {
            return;
        }
        let cached = CachedResponse {
            response: response.clone(),
            metadata: CacheMetadata {
                created_at: now,
                hit_count: 0,
                source_model: fingerprint.model.clone(),
                mode: fingerprint.mode,
                temperature_bucket: fingerprint.temperature_bucket,
                is_golden: false,
            },
        };
        if let Err(e) = timed(
            &self.breakers.hot,
            self.timeouts.hot_store,
            "hot_store",
            self.hot
                .set(&self.config.tenant, &fingerprint.exact_key, &cached, ttl),
        )
        .await
        {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "hot tier write failed");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_indexed(
        &self,
        fingerprint: &Fingerprint,
        embedding: Option<Vec<f32>>,
        request: &ChatCompletionRequest,
        response: &ChatCompletionResponse,
        now: DateTime<Utc>,
        ttl: Duration,
    ) {
        if !self.breakers.indexed.allow() {
            return;
        }
        let request_blob = match self.request_blob(request) {
            Ok(blob) => blob,
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "request blob serialization failed");
                return;
            }
        };
        let response_blob = match serde_json::to_value(response) {
            Ok(blob) => blob,
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "response blob serialization failed");
                return;
            }
        };

        let entry = CacheEntry {
            id: Uuid::new_v4(),
            tenant: self.config.tenant.clone(),
            exact_key: fingerprint.exact_key.clone(),
            simhash: fingerprint.simhash,
            embedding,
            canonical_prompt: fingerprint.masked_prompt.clone(),
            raw_prompt_hmac: fingerprint.raw_digest.clone(),
            request_blob,
            response_blob,
            model: fingerprint.model.clone(),
            temperature_bucket: fingerprint.temperature_bucket,
            mode: fingerprint.mode,
            tool_schema_hash: fingerprint.tool_schema_hash.clone(),
            hit_count: 0,
            last_hit_at: None,
            is_golden: false,
            pii_present: fingerprint.pii_present,
            created_at: now,
            expires_at: Some(
                now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()),
            ),
        };

        match timed(
            &self.breakers.indexed,
            self.timeouts.indexed_store,
            "indexed_store",
            self.indexed.insert(entry),
        )
        .await
        {
            Ok(inserted) => {
                if !inserted {
                    tracing::debug!(exact_key = %fingerprint.exact_key, "duplicate entry ignored");
                }
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "indexed tier write failed");
            }
        }
    }

    /// The stored request blob. In privacy mode every message content is
    /// replaced by its masked form so the raw prompt never persists.
    fn request_blob(&self, request: &ChatCompletionRequest) -> Result<Value> {
        let mut blob = serde_json::to_value(request)?;
        if self.config.privacy_mode {
            if let Some(messages) = blob.get_mut("messages").and_then(Value::as_array_mut) {
                for message in messages {
                    if let Some(content) = message.get_mut("content") {
                        if let Some(text) = content.as_str() {
                            *content =
                                Value::String(self.fingerprinter.masker().mask(text).masked);
                        } else if content.is_array() {
                            // Multi-part content: drop the parts, keep the
                            // masked flattened text.
                            let flattened = content
                                .as_array()
                                .map(|parts| {
                                    parts
                                        .iter()
                                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                                        .collect::<Vec<_>>()
                                        .join(" ")
                                })
                                .unwrap_or_default();
                            *content =
                                Value::String(self.fingerprinter.masker().mask(&flattened).masked);
                        }
                    }
                }
            }
        }
        Ok(blob)
    }

    fn ttl_for_model(&self, model: &str) -> Duration {
        self.config
            .ttl_for_family(&crate::fingerprint::model_family(model))
    }

    /// TTL sweep over the indexed tier. Returns purged row count.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.indexed.purge_expired(Utc::now()).await
    }

    /// Pin or unpin a template entry.
    pub async fn set_golden(&self, id: Uuid, golden: bool) -> Result<bool> {
        self.indexed.set_golden(id, golden).await
    }

    /// Delete a template entry by id. The hot-tier copy, if any, ages out
    /// by TTL.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.indexed.delete(id).await
    }

    /// Delete the exact-tier value for a specific request.
    pub async fn evict_exact(&self, request: &ChatCompletionRequest) -> Result<bool> {
        let fingerprint = self.fingerprinter.fingerprint(request)?;
        self.hot
            .delete(&self.config.tenant, &fingerprint.exact_key)
            .await
    }

    /// Clear both tiers.
    pub async fn clear(&self) -> Result<()> {
        self.hot.clear().await?;
        self.indexed.clear().await?;
        tracing::info!("cleared all cache tiers");
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStatistics> {
        let now = Utc::now();
        Ok(CacheStatistics {
            exact_entries: self.hot.len().await.unwrap_or(0) as u64,
            template_entries: self.indexed.count(&self.config.tenant).await?,
            active_entries: self.indexed.count_active(&self.config.tenant, now).await?,
            total_entry_hits: self.indexed.total_hits(&self.config.tenant).await?,
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            exact_hits: self.counters.exact_hits.load(Ordering::Relaxed),
            template_hits: self.counters.template_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        })
    }
}

fn model_filter(policy: ModelCompatPolicy, fingerprint: &Fingerprint) -> ModelFilter {
    match policy {
        ModelCompatPolicy::Strict => ModelFilter::Exact(fingerprint.model.clone()),
        ModelCompatPolicy::Family => ModelFilter::Family(fingerprint.model_family.clone()),
        ModelCompatPolicy::Any => ModelFilter::Any,
    }
}

/// Run a dependency call under its timeout, recording the outcome with the
/// breaker. Timeouts count as failures.
async fn timed<T, F>(
    breaker: &CircuitBreaker,
    timeout: Duration,
    dependency: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => {
            breaker.record_success(start.elapsed());
            Ok(value)
        }
        Ok(Err(e)) => {
            breaker.record_failure();
            Err(e)
        }
        Err(_) => {
            breaker.record_failure();
            Err(Error::dependency(dependency, "timeout"))
        }
    }
}
