//! Shared doubles for the integration tests: a scripted embedder, a
//! scripted upstream and failing store wrappers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use ai_cache_proxy::config::{CacheSettings, TimeoutSettings};
use ai_cache_proxy::embeddings::Embedder;
use ai_cache_proxy::provider::UpstreamProvider;
use ai_cache_proxy::store::{
    CachedResponse, HotStore, IndexedStore, MemoryHotStore, MemoryIndexedStore,
};
use ai_cache_proxy::types::request::ChatCompletionRequest;
use ai_cache_proxy::types::response::ChatCompletionResponse;
use ai_cache_proxy::{BoxStream, CacheEngine, Error, ProxyService, Result};

pub const DIM: usize = 8;

/// Embedder whose vectors are scripted per prompt text; unscripted prompts
/// get a stable hash-derived unit vector so distinct texts stay apart.
pub struct ScriptedEmbedder {
    scripted: Mutex<HashMap<String, Vec<f32>>>,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
        }
    }

    /// Script the vector for a full prompt text (role-tagged, e.g.
    /// `"user: What is 2+2?"`). The vector is normalized on the way in.
    pub fn script(&self, prompt: &str, vector: Vec<f32>) {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized = vector.iter().map(|x| x / norm).collect();
        self.scripted.lock().insert(prompt.to_string(), normalized);
    }

    fn fallback(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut v: Vec<f32> = digest[..DIM].iter().map(|b| *b as f32 - 127.5).collect();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(v) = self.scripted.lock().get(text) {
            return Ok(v.clone());
        }
        Ok(self.fallback(text))
    }

    fn dim(&self) -> usize {
        DIM
    }

    fn ready(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Upstream double: returns a canned answer per prompt and counts calls.
pub struct ScriptedUpstream {
    answers: Mutex<HashMap<String, String>>,
    default_answer: String,
    pub calls: AtomicU64,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            default_answer: "scripted answer".to_string(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn answer(&self, user_content: &str, answer: &str) {
        self.answers
            .lock()
            .insert(user_content.to_string(), answer.to_string());
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn response_for(&self, request: &ChatCompletionRequest) -> ChatCompletionResponse {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let user_content = request
            .messages
            .iter()
            .rev()
            .find_map(|m| m.content.as_ref().map(|c| c.flattened_text()))
            .unwrap_or_default();
        let content = self
            .answers
            .lock()
            .get(&user_content)
            .cloned()
            .unwrap_or_else(|| self.default_answer.clone());
        serde_json::from_value(serde_json::json!({
            "id": format!("chatcmpl-test-{}", call),
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12}
        }))
        .unwrap()
    }
}

#[async_trait]
impl UpstreamProvider for ScriptedUpstream {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        Ok(self.response_for(request))
    }

    async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<BoxStream<'static, Bytes>> {
        let response = self.response_for(request);
        let content = response.first_content().unwrap_or("").to_string();
        let mk = |payload: serde_json::Value| -> Result<Bytes> {
            Ok(Bytes::from(format!("data: {}\n\n", payload)))
        };
        let mut frames = vec![mk(serde_json::json!({
            "id": response.id.as_str(), "object": "chat.completion.chunk",
            "created": response.created, "model": response.model.as_str(),
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
        }))];
        for word in content.split_inclusive(' ') {
            frames.push(mk(serde_json::json!({
                "id": response.id.as_str(), "object": "chat.completion.chunk",
                "created": response.created, "model": response.model.as_str(),
                "choices": [{"index": 0, "delta": {"content": word}, "finish_reason": null}]
            })));
        }
        frames.push(mk(serde_json::json!({
            "id": response.id.as_str(), "object": "chat.completion.chunk",
            "created": response.created, "model": response.model.as_str(),
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        })));
        frames.push(Ok(Bytes::from("data: [DONE]\n\n")));
        Ok(Box::pin(stream::iter(frames)))
    }
}

/// Hot tier that always fails, for degradation drills.
pub struct FailingHotStore;

#[async_trait]
impl HotStore for FailingHotStore {
    async fn get(&self, _: &str, _: &str) -> Result<Option<CachedResponse>> {
        Err(Error::dependency("hot_store", "connection refused"))
    }
    async fn set(&self, _: &str, _: &str, _: &CachedResponse, _: Duration) -> Result<()> {
        Err(Error::dependency("hot_store", "connection refused"))
    }
    async fn delete(&self, _: &str, _: &str) -> Result<bool> {
        Err(Error::dependency("hot_store", "connection refused"))
    }
    async fn clear(&self) -> Result<()> {
        Err(Error::dependency("hot_store", "connection refused"))
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Indexed tier that always fails, for degradation drills.
pub struct FailingIndexedStore;

#[async_trait]
impl IndexedStore for FailingIndexedStore {
    async fn insert(&self, _: ai_cache_proxy::store::CacheEntry) -> Result<bool> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn find_by_exact_key(
        &self,
        _: &str,
        _: &str,
    ) -> Result<Option<ai_cache_proxy::store::CacheEntry>> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn find_candidates(
        &self,
        _: &ai_cache_proxy::store::CandidateQuery,
    ) -> Result<Vec<ai_cache_proxy::store::CacheEntry>> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn find_semantic_candidates(
        &self,
        _: &ai_cache_proxy::store::CandidateQuery,
        _: &[f32],
    ) -> Result<Vec<ai_cache_proxy::store::CacheEntry>> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn record_hit(&self, _: uuid::Uuid, _: chrono::DateTime<chrono::Utc>) -> Result<()> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn set_golden(&self, _: uuid::Uuid, _: bool) -> Result<bool> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn purge_expired(&self, _: chrono::DateTime<chrono::Utc>) -> Result<usize> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn delete(&self, _: uuid::Uuid) -> Result<bool> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn clear(&self) -> Result<()> {
        Err(Error::dependency("indexed_store", "connection refused"))
    }
    async fn count(&self, _: &str) -> Result<u64> {
        Ok(0)
    }
    async fn count_active(&self, _: &str, _: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        Ok(0)
    }
    async fn total_hits(&self, _: &str) -> Result<u64> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// A fully wired test fixture over in-memory stores.
pub struct Fixture {
    pub engine: Arc<CacheEngine>,
    pub proxy: ProxyService,
    pub embedder: Arc<ScriptedEmbedder>,
    pub upstream: Arc<ScriptedUpstream>,
    pub indexed: Arc<MemoryIndexedStore>,
    pub hot: Arc<MemoryHotStore>,
}

impl Fixture {
    pub fn new(settings: CacheSettings) -> Self {
        let hot = Arc::new(MemoryHotStore::new(settings.max_hot_entries));
        let indexed = Arc::new(MemoryIndexedStore::new());
        let embedder = Arc::new(ScriptedEmbedder::new());
        let upstream = Arc::new(ScriptedUpstream::new());
        let engine = Arc::new(CacheEngine::new(
            settings,
            TimeoutSettings::default(),
            hot.clone() as Arc<dyn HotStore>,
            indexed.clone() as Arc<dyn IndexedStore>,
            embedder.clone() as Arc<dyn Embedder>,
        ));
        let proxy = ProxyService::new(engine.clone(), upstream.clone());
        Self {
            engine,
            proxy,
            embedder,
            upstream,
            indexed,
            hot,
        }
    }

    pub fn with_stores(
        settings: CacheSettings,
        hot: Arc<dyn HotStore>,
        indexed: Arc<dyn IndexedStore>,
    ) -> (Arc<CacheEngine>, ProxyService, Arc<ScriptedUpstream>) {
        let embedder = Arc::new(ScriptedEmbedder::new());
        let upstream = Arc::new(ScriptedUpstream::new());
        let engine = Arc::new(CacheEngine::new(
            settings,
            TimeoutSettings::default(),
            hot,
            indexed,
            embedder as Arc<dyn Embedder>,
        ));
        let proxy = ProxyService::new(engine.clone(), upstream.clone());
        (engine, proxy, upstream)
    }
}

/// Poll until `probe` returns true or the deadline passes. Write-through is
/// asynchronous with respect to responses, so tests wait instead of racing.
pub async fn wait_until<F, Fut>(mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if probe().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
