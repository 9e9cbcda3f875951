//! Upstream provider seam.
//!
//! Providers are a closed set of variants dispatched by model-name pattern.
//! The proxy speaks the OpenAI-compatible chat surface to all of them;
//! anything beyond that (full wire conversion, credential storage) lives
//! outside this crate. The [`UpstreamProvider`] trait is the seam tests and
//! alternative transports plug into.

mod client;

pub use client::HttpUpstream;

use async_trait::async_trait;
use bytes::Bytes;

use crate::types::request::ChatCompletionRequest;
use crate::types::response::ChatCompletionResponse;
use crate::{BoxStream, Result};

/// Known provider backends, selected by model-name pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Bedrock,
}

impl ProviderKind {
    /// Dispatch by model-name pattern; unknown prefixes default to OpenAI.
    pub fn from_model(model: &str) -> Self {
        let model = model.to_lowercase();
        if model.starts_with("claude") {
            ProviderKind::Anthropic
        } else if model.starts_with("amazon.")
            || model.starts_with("anthropic.")
            || model.starts_with("meta.")
            || model.starts_with("arn:aws:bedrock")
        {
            ProviderKind::Bedrock
        } else {
            // gpt-*, o*, text-*, davinci and everything else.
            ProviderKind::OpenAi
        }
    }

    /// Key into the provider configuration map.
    pub fn config_key(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Bedrock => "bedrock",
        }
    }
}

/// The upstream forward contract. Errors out of `complete` carry the
/// provider status and body verbatim; byte streams out of `stream` are
/// forwarded to the client unmodified.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse>;

    async fn stream(&self, request: &ChatCompletionRequest)
        -> Result<BoxStream<'static, Bytes>>;
}
