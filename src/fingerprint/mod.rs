//! 指纹模块：结构指纹、模式检测与工具签名。
//!
//! # Fingerprinting Module
//!
//! Derives every cache-relevant signal from a request in one pass.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Fingerprinter`] | Request → [`Fingerprint`] (everything but the embedding) |
//! | [`simhash`] | 64-bit structural fingerprint over the masked prompt |
//! | [`RequestMode`] | TEXT / JSON_OBJECT / JSON_SCHEMA / TOOLS / FUNCTION |
//! | [`tool_schema`] | Name-sorted canonical tool-list hash |
//! | [`TemperatureBucket`] | Ordered sampling-parameter buckets |
//!
//! The SimHash is computed over the **masked** prompt so that structurally
//! identical templates collide; the embedding (added later by the engine) is
//! computed over the **raw** prompt so that distinct concrete inputs stay
//! distinguishable. Never swap the two.

pub mod mode;
pub mod simhash;
pub mod tool_schema;

pub use mode::{model_family, RequestMode, TemperatureBucket};

use crate::canonical::{extract_prompt_text, Canonicalizer, PromptMasker};
use crate::types::request::ChatCompletionRequest;
use crate::Result;

/// Everything the cache derives from a request. The embedding is filled in
/// by the engine because producing it can suspend (and may be degraded
/// away); all other fields are pure CPU.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    /// SHA-256 over the canonical request JSON, lowercase hex.
    pub exact_key: String,
    /// Canonical request JSON (stored alongside entries for diagnostics).
    pub canonical_json: String,
    /// 64-bit SimHash over the masked prompt.
    pub simhash: i64,
    /// Raw role-tagged prompt text; embedding input.
    pub prompt_text: String,
    /// Masked template form of the prompt; SimHash input.
    pub masked_prompt: String,
    /// Digest of the raw prompt (keyed when a secret is configured).
    pub raw_digest: String,
    /// L2-normalized embedding over the raw prompt, when available.
    pub embedding: Option<Vec<f32>>,
    pub mode: RequestMode,
    pub tool_schema_hash: String,
    pub temperature_bucket: TemperatureBucket,
    pub model: String,
    pub model_family: String,
    pub pii_present: bool,
}

/// Computes [`Fingerprint`]s. Holds the compiled masking patterns so they
/// are built once per process.
pub struct Fingerprinter {
    canonicalizer: Canonicalizer,
    masker: PromptMasker,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::with_masker(PromptMasker::new())
    }

    pub fn with_masker(masker: PromptMasker) -> Self {
        Self {
            canonicalizer: Canonicalizer::new(),
            masker,
        }
    }

    pub fn fingerprint(&self, request: &ChatCompletionRequest) -> Result<Fingerprint> {
        let canonical = self.canonicalizer.canonicalize(request)?;
        let prompt_text = extract_prompt_text(request);
        let masked = self.masker.mask(&prompt_text);
        let simhash = simhash::generate(&masked.masked);
        let pii_present = self.masker.contains_pii(&prompt_text);

        Ok(Fingerprint {
            exact_key: canonical.exact_key,
            canonical_json: canonical.json,
            simhash,
            raw_digest: masked.raw_digest,
            masked_prompt: masked.masked,
            embedding: None,
            mode: RequestMode::detect(request),
            tool_schema_hash: tool_schema::hash_tool_surface(
                request.tools.as_deref(),
                request.functions.as_deref(),
            ),
            temperature_bucket: TemperatureBucket::from_temperature(request.temperature),
            model: request.model.clone(),
            model_family: model_family(&request.model),
            pii_present,
            prompt_text,
        })
    }

    pub fn masker(&self) -> &PromptMasker {
        &self.masker
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}
