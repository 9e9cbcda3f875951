//! 错误处理模块：提供统一的错误类型和结构化错误上下文。
//!
//! # Error Handling Module
//!
//! This module provides the unified error type and structured error context
//! used across the proxy core.
//!
//! ## Error Categories
//!
//! | Variant | Description |
//! |---------|-------------|
//! | `Validation` | Invalid client request (400-class, never cached) |
//! | `Upstream` | Provider error, passed through verbatim including status |
//! | `Dependency` | Hot tier / indexed tier / embedder failure (breaker-recorded) |
//! | `Configuration` | Configuration and setup errors |
//! | `Runtime` | Runtime execution errors |
//! | `Serialization` | JSON encode/decode errors |
//! | `Io` | I/O errors (compression buffers, sockets) |
//!
//! The cache path is non-fatal by design: `Dependency` errors are absorbed by
//! the resilience layer and degrade to a defined mode. The upstream-forward
//! path is fatal-on-error: whatever the provider returns is what the client
//! sees.

use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error
    /// (e.g., "request.messages", "cache.similarity_threshold")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "canonicalizer", "hot_store", "embedder")
    pub source: Option<String>,
    /// Request identifier for tracking
    pub request_id: Option<String>,
    /// HTTP status code if applicable
    pub status_code: Option<u16>,
    /// Flag indicating if the error is retryable
    pub retryable: Option<bool>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

/// Unified error type for the proxy core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Upstream error: HTTP {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        /// Raw provider body, forwarded to the client verbatim.
        body: Option<String>,
    },

    #[error("Dependency error ({dependency}): {message}{}", format_context(.context))]
    Dependency {
        dependency: &'static str,
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if let Some(ref id) = ctx.request_id {
        parts.push(format!("request_id: {}", id));
    }
    if let Some(code) = ctx.status_code {
        parts.push(format!("status: {}", code));
    }
    if let Some(retryable) = ctx.retryable {
        parts.push(format!("retryable: {}", retryable));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!(" [{}]", parts.join(", "))
    }
}

impl Error {
    /// Create a simple validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_with_context(msg, ErrorContext::new())
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a simple configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a simple runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::runtime_with_context(msg, ErrorContext::new())
    }

    /// Create a dependency error for the named collaborator
    pub fn dependency(dependency: &'static str, msg: impl Into<String>) -> Self {
        Error::Dependency {
            dependency,
            message: msg.into(),
            context: ErrorContext::new().with_source(dependency),
        }
    }

    /// Create an upstream error that carries the provider body verbatim
    pub fn upstream(status: u16, msg: impl Into<String>, body: Option<String>) -> Self {
        Error::Upstream {
            status,
            message: msg.into(),
            body,
        }
    }

    /// Whether this error belongs to the non-fatal cache path.
    pub fn is_cache_path(&self) -> bool {
        matches!(self, Error::Dependency { .. })
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::Dependency { context, .. }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_formatting() {
        let err = Error::validation_with_context(
            "messages cannot be empty",
            ErrorContext::new()
                .with_field_path("request.messages")
                .with_source("proxy"),
        );
        let msg = err.to_string();
        assert!(msg.contains("messages cannot be empty"));
        assert!(msg.contains("field: request.messages"));
        assert!(msg.contains("source: proxy"));
    }

    #[test]
    fn test_dependency_is_cache_path() {
        assert!(Error::dependency("hot_store", "connection refused").is_cache_path());
        assert!(!Error::validation("bad request").is_cache_path());
        assert!(!Error::upstream(502, "bad gateway", None).is_cache_path());
    }

    #[test]
    fn test_upstream_preserves_status() {
        let err = Error::upstream(429, "rate limited", Some("{\"error\":\"slow down\"}".into()));
        match err {
            Error::Upstream { status, body, .. } => {
                assert_eq!(status, 429);
                assert_eq!(body.as_deref(), Some("{\"error\":\"slow down\"}"));
            }
            _ => panic!("expected Upstream"),
        }
    }
}
