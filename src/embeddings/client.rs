//! Remote embedding client (OpenAI-compatible `/v1/embeddings`).

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde::Serialize;

use super::{vectors, Embedder};
use crate::{Error, ErrorContext, Result};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// OpenAI-compatible embedding client.
///
/// Memoizes recent `text → vector` results in an LRU so a write-through
/// immediately after a template lookup does not pay for the same embedding
/// twice.
pub struct RemoteEmbedder {
    http_client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    dim: usize,
    request_dimensions: bool,
    ready: AtomicBool,
    memo: Mutex<LruCache<String, Vec<f32>>>,
}

impl RemoteEmbedder {
    pub fn builder() -> RemoteEmbedderBuilder {
        RemoteEmbedderBuilder::new()
    }

    async fn fetch(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: text,
            model: &self.model,
            dimensions: self.request_dimensions.then_some(self.dim),
        };
        let endpoint = format!("{}/v1/embeddings", self.base_url);
        let response = self
            .http_client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::dependency("embedder", format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::dependency("embedder", format!("failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(Error::Dependency {
                dependency: "embedder",
                message: format!("embedding API error: {}", body),
                context: ErrorContext::new()
                    .with_source("embedder")
                    .with_status_code(status.as_u16()),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body)?;
        let vector: Vec<f32> = json["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| Error::dependency("embedder", "missing 'data[0].embedding' array"))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.len() != self.dim {
            return Err(Error::dependency(
                "embedder",
                format!(
                    "dimension drift: expected {}, got {}",
                    self.dim,
                    vector.len()
                ),
            ));
        }

        Ok(vectors::normalize_vector(&vector))
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self
            .memo
            .lock()
            .ok()
            .and_then(|mut memo| memo.get(text).cloned())
        {
            return Ok(hit);
        }

        match self.fetch(text).await {
            Ok(vector) => {
                self.ready.store(true, Ordering::Relaxed);
                if let Ok(mut memo) = self.memo.lock() {
                    memo.put(text.to_string(), vector.clone());
                }
                Ok(vector)
            }
            Err(e) => {
                self.ready.store(false, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

pub struct RemoteEmbedderBuilder {
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    dim: usize,
    request_dimensions: bool,
    timeout: Duration,
    memo_capacity: usize,
}

impl RemoteEmbedderBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            api_key: None,
            base_url: None,
            dim: 384,
            request_dimensions: false,
            timeout: Duration::from_secs(2),
            memo_capacity: 1024,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Ask the service to truncate to `dim` (supported by OpenAI v3 models).
    pub fn request_dimensions(mut self, enabled: bool) -> Self {
        self.request_dimensions = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<RemoteEmbedder> {
        let model = self
            .model
            .ok_or_else(|| Error::configuration("embedding model must be specified"))?;
        let api_key = self
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| Error::configuration("embedding API key required"))?;
        let base_url = self
            .base_url
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to create HTTP client: {}", e)))?;
        let capacity = NonZeroUsize::new(self.memo_capacity.max(1)).expect("non-zero capacity");
        Ok(RemoteEmbedder {
            http_client,
            model,
            base_url,
            api_key,
            dim: self.dim,
            request_dimensions: self.request_dimensions,
            ready: AtomicBool::new(true),
            memo: Mutex::new(LruCache::new(capacity)),
        })
    }
}

impl Default for RemoteEmbedderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
