//! 规范化模块：请求规范化、提示词提取与敏感内容掩码。
//!
//! # Canonicalization Module
//!
//! Turns a chat completion request into the stable artifacts every cache
//! decision is keyed on.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Canonicalizer`] | Request → canonical JSON → SHA-256 exact key |
//! | [`PromptMasker`] | Raw prompt → masked template form + raw digest |
//! | [`extract_prompt_text`] | Role-tagged prompt concatenation |
//!
//! Same logical request → same canonical form → same exact key. The masked
//! form feeds the structural fingerprint; the raw form feeds the embedding.
//! Never the other way around.

mod canonicalizer;
mod masker;

pub use canonicalizer::{Canonical, Canonicalizer};
pub use masker::{MaskedPrompt, PromptMasker};

pub(crate) use canonicalizer::{canonicalize_value, sha256_hex, write_canonical};

use crate::types::request::ChatCompletionRequest;

/// Concatenate all messages as `"<role>: <content>"` joined by newlines,
/// system messages included, preserving order. Messages without content are
/// skipped.
pub fn extract_prompt_text(request: &ChatCompletionRequest) -> String {
    request
        .messages
        .iter()
        .filter_map(|m| {
            m.content
                .as_ref()
                .map(|c| format!("{}: {}", m.role.as_str(), c.flattened_text()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
