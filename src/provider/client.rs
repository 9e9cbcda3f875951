//! HTTP upstream forwarding.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use super::{ProviderKind, UpstreamProvider};
use crate::config::ProviderSettings;
use crate::types::request::ChatCompletionRequest;
use crate::types::response::ChatCompletionResponse;
use crate::{BoxStream, Error, Result};

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Forwards requests to the configured provider endpoints over HTTP.
///
/// Transient failures (network errors, 5xx) retry with capped exponential
/// backoff; anything the provider returns is otherwise passed through
/// verbatim, status included, and never cached.
pub struct HttpUpstream {
    http_client: reqwest::Client,
    providers: HashMap<String, ProviderSettings>,
    max_retries: u32,
}

impl HttpUpstream {
    pub fn new(providers: HashMap<String, ProviderSettings>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            providers,
            max_retries: 3,
        })
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    fn settings_for(&self, model: &str) -> Result<(&ProviderSettings, ProviderKind)> {
        let kind = ProviderKind::from_model(model);
        let settings = self
            .providers
            .get(kind.config_key())
            .filter(|s| s.enabled)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "provider not configured or disabled: {}",
                    kind.config_key()
                ))
            })?;
        Ok((settings, kind))
    }

    fn request_builder(
        &self,
        settings: &ProviderSettings,
        kind: ProviderKind,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let mut request = request.clone();
        request.stream = stream.then_some(true);

        let builder = self
            .http_client
            .post(format!("{}/chat/completions", settings.base_url))
            .json(&request);
        match kind {
            ProviderKind::Anthropic => builder
                .header("x-api-key", &settings.api_key)
                .header("anthropic-version", "2023-06-01"),
            _ => builder.bearer_auth(&settings.api_key),
        }
    }

    async fn send_with_retry(
        &self,
        settings: &ProviderSettings,
        kind: ProviderKind,
        request: &ChatCompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            let result = self
                .request_builder(settings, kind, request, stream)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_server_error() && attempt < self.max_retries => {
                    tracing::warn!(
                        status = response.status().as_u16(),
                        attempt,
                        "upstream 5xx, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(error = %e, attempt, "upstream send failed, retrying");
                }
                Err(e) => {
                    return Err(Error::upstream(
                        502,
                        format!("upstream unreachable: {}", e),
                        None,
                    ))
                }
            }
            attempt += 1;
            let backoff = Duration::from_secs(1 << attempt.min(4)).min(MAX_BACKOFF);
            tokio::time::sleep(backoff).await;
        }
    }
}

#[async_trait]
impl UpstreamProvider for HttpUpstream {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let (settings, kind) = self.settings_for(&request.model)?;
        tracing::info!(provider = kind.config_key(), model = %request.model, "forwarding to provider");

        let response = self.send_with_retry(settings, kind, request, false).await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::upstream(502, format!("failed to read upstream body: {}", e), None)
        })?;
        if !status.is_success() {
            return Err(Error::upstream(
                status.as_u16(),
                "provider error",
                Some(body),
            ));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<BoxStream<'static, Bytes>> {
        let (settings, kind) = self.settings_for(&request.model)?;
        tracing::info!(provider = kind.config_key(), model = %request.model, "forwarding stream to provider");

        let response = self.send_with_retry(settings, kind, request, true).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(
                status.as_u16(),
                "provider error",
                Some(body),
            ));
        }

        let stream = response.bytes_stream().map(|item| {
            item.map_err(|e| Error::upstream(502, format!("upstream stream error: {}", e), None))
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> HttpUpstream {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderSettings::new("https://api.openai.example", "sk-test"),
        );
        HttpUpstream::new(providers, Duration::from_secs(60)).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_provider_rejected() {
        let up = upstream();
        let request = ChatCompletionRequest::new(
            "claude-3-opus",
            vec![crate::types::request::Message::user("hi")],
        );
        let result = up.complete(&request).await;
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_disabled_provider_rejected() {
        let mut providers = HashMap::new();
        let mut settings = ProviderSettings::new("https://api.openai.example", "sk-test");
        settings.enabled = false;
        providers.insert("openai".to_string(), settings);
        let up = HttpUpstream::new(providers, Duration::from_secs(60)).unwrap();

        let request = ChatCompletionRequest::new(
            "gpt-4",
            vec![crate::types::request::Message::user("hi")],
        );
        assert!(up.complete(&request).await.is_err());
    }
}
