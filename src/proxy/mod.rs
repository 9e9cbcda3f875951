//! 代理编排模块：缓存查找、上游转发与流式响应。
//!
//! # Proxy Orchestration Module
//!
//! [`ProxyService`] glues the engine, the upstream seam and the replayer
//! together: validate → lookup → serve hit (direct or deterministic replay)
//! or forward to the provider with asynchronous write-through. This is the
//! layer an HTTP ingress mounts; it owns no wire framing of its own beyond
//! the SSE frames the replayer and passthrough already speak.
//!
//! Failure policy: the cache path is non-fatal and degrades silently; the
//! upstream path is fatal-on-error: whatever the provider returns is what
//! the client sees, and provider errors are never cached.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::StreamExt;

use crate::engine::control::CacheControl;
use crate::engine::{CacheEngine, Provenance};
use crate::provider::UpstreamProvider;
use crate::replay::{capture_stream, StreamReplayer};
use crate::resilience::CircuitBreaker;
use crate::types::request::ChatCompletionRequest;
use crate::types::response::ChatCompletionResponse;
use crate::{BoxStream, Error, ErrorContext, Result};

/// A complete (non-streaming) proxy outcome.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub response: ChatCompletionResponse,
    pub provenance: Provenance,
}

/// A streaming proxy outcome: provenance for the response headers plus the
/// SSE byte stream. Dropping the stream cancels upstream forwarding and
/// replay pacing alike.
pub struct ProxyStream {
    pub provenance: Provenance,
    pub frames: BoxStream<'static, Bytes>,
}

/// Dependency health and degradation state for `GET /health`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub dependencies: Vec<(&'static str, &'static str)>,
    pub degraded: bool,
    pub degradation_reason: Option<&'static str>,
}

/// Orchestrates cache lookup and provider forwarding.
pub struct ProxyService {
    engine: Arc<CacheEngine>,
    upstream: Arc<dyn UpstreamProvider>,
    replayer: StreamReplayer,
}

impl ProxyService {
    pub fn new(engine: Arc<CacheEngine>, upstream: Arc<dyn UpstreamProvider>) -> Self {
        Self {
            engine,
            upstream,
            replayer: StreamReplayer::new(),
        }
    }

    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    /// Snapshot for `GET /v1/cache/stats`.
    pub async fn stats(&self) -> Result<crate::engine::CacheStatistics> {
        self.engine.stats().await
    }

    /// `POST /v1/cache/clear`.
    pub async fn clear_cache(&self) -> Result<()> {
        self.engine.clear().await
    }

    /// Per-dependency breaker states plus the active degradation mode, the
    /// payload of `GET /health`.
    pub fn health(&self) -> HealthReport {
        let breakers = self.engine.breakers();
        let degradation = breakers.degradation();
        HealthReport {
            dependencies: breakers
                .health()
                .into_iter()
                .map(|(name, state)| (name, state.as_str()))
                .collect(),
            degraded: degradation.is_degraded(),
            degradation_reason: degradation.reason(),
        }
    }

    /// Handle a non-streaming request: cache hit or upstream forward with
    /// asynchronous write-through.
    pub async fn process(
        &self,
        request: &ChatCompletionRequest,
        control: &CacheControl,
    ) -> Result<ProxyResponse> {
        validate(request)?;
        let degradation = self.engine.degradation();

        if let Some(hit) = self.engine.lookup(request, control).await? {
            return Ok(ProxyResponse {
                response: hit.response.as_cached(),
                provenance: hit.provenance(degradation),
            });
        }

        let response = self.forward(request).await?;
        self.spawn_write_through(request, &response, control);

        Ok(ProxyResponse {
            response,
            provenance: Provenance::miss().with_degradation(degradation.reason()),
        })
    }

    /// Handle a streaming request. A hit replays the cached answer
    /// deterministically; a miss forwards upstream bytes while capturing
    /// them for write-through on completion.
    pub async fn process_stream(
        &self,
        request: &ChatCompletionRequest,
        control: &CacheControl,
    ) -> Result<ProxyStream> {
        validate(request)?;
        let degradation = self.engine.degradation();

        if let Some(hit) = self.engine.lookup(request, control).await? {
            let fingerprint = self.engine.fingerprint(request)?;
            let frames = self
                .replayer
                .replay(&hit.response, &fingerprint.exact_key, true)?
                .map(|frame| frame.map(Bytes::from));
            return Ok(ProxyStream {
                provenance: hit.provenance(degradation),
                frames: Box::pin(frames),
            });
        }

        let upstream_stream = self.forward_stream(request).await?;

        let engine = Arc::clone(&self.engine);
        let store_request = request.clone();
        let store_control = control.clone();
        let frames = capture_stream(upstream_stream, move |response| {
            // Write-through never blocks the client; the stream has already
            // delivered its last frame when this fires.
            tokio::spawn(async move {
                engine.store(&store_request, &response, &store_control).await;
            });
        });

        Ok(ProxyStream {
            provenance: Provenance::miss().with_degradation(degradation.reason()),
            frames,
        })
    }

    fn spawn_write_through(
        &self,
        request: &ChatCompletionRequest,
        response: &ChatCompletionResponse,
        control: &CacheControl,
    ) {
        let engine = Arc::clone(&self.engine);
        let request = request.clone();
        let response = response.clone();
        let control = control.clone();
        tokio::spawn(async move {
            engine.store(&request, &response, &control).await;
        });
    }

    async fn forward(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let breaker = self.engine.breakers().upstream.clone();
        guard_upstream(&breaker)?;
        let start = Instant::now();
        match self.upstream.complete(request).await {
            Ok(response) => {
                breaker.record_success(start.elapsed());
                Ok(response)
            }
            Err(e) => {
                record_upstream_outcome(&breaker, &e, start);
                Err(e)
            }
        }
    }

    async fn forward_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<BoxStream<'static, Bytes>> {
        let breaker = self.engine.breakers().upstream.clone();
        guard_upstream(&breaker)?;
        let start = Instant::now();
        match self.upstream.stream(request).await {
            Ok(stream) => {
                breaker.record_success(start.elapsed());
                Ok(stream)
            }
            Err(e) => {
                record_upstream_outcome(&breaker, &e, start);
                Err(e)
            }
        }
    }
}

fn guard_upstream(breaker: &CircuitBreaker) -> Result<()> {
    if breaker.allow() {
        Ok(())
    } else {
        Err(Error::upstream(
            503,
            "upstream circuit open",
            Some("{\"error\":{\"message\":\"upstream temporarily unavailable\"}}".to_string()),
        ))
    }
}

/// Provider 4xx means the dependency itself answered; only 5xx and
/// transport failures feed the breaker.
fn record_upstream_outcome(breaker: &CircuitBreaker, error: &Error, start: Instant) {
    match error {
        Error::Upstream { status, .. } if *status < 500 => {
            breaker.record_success(start.elapsed());
        }
        _ => breaker.record_failure(),
    }
}

/// Invalid requests are rejected before any cache or upstream work and are
/// never cached.
fn validate(request: &ChatCompletionRequest) -> Result<()> {
    if request.model.trim().is_empty() {
        return Err(Error::validation_with_context(
            "model must be specified",
            ErrorContext::new().with_field_path("request.model"),
        ));
    }
    if request.messages.is_empty() {
        return Err(Error::validation_with_context(
            "messages cannot be empty",
            ErrorContext::new().with_field_path("request.messages"),
        ));
    }
    Ok(())
}
