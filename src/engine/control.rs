//! Per-request cache control parsed from HTTP headers.

use super::headers;

/// Which lookup tiers a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookupMode {
    Exact,
    Template,
    Both,
}

/// Model compatibility policy for the model guardrail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCompatPolicy {
    /// Exact model string equality. `gpt-4` ≠ `gpt-4-turbo`.
    Strict,
    /// Same family after suffix stripping. `gpt-4` = `gpt-4-0613`.
    Family,
    /// Any model. Only safe when the caller knows the models agree.
    Any,
}

/// Per-request overrides of cache behavior, parsed from request headers.
#[derive(Debug, Clone)]
pub struct CacheControl {
    /// Skip lookup entirely and force a miss.
    pub bypass: bool,
    /// Whether the response may be written through.
    pub store: bool,
    pub mode: CacheLookupMode,
    pub model_compat: ModelCompatPolicy,
    /// Opaque tag for downstream analysis.
    pub experiment: Option<String>,
}

impl Default for CacheControl {
    fn default() -> Self {
        Self {
            bypass: false,
            store: true,
            mode: CacheLookupMode::Both,
            model_compat: ModelCompatPolicy::Strict,
            experiment: None,
        }
    }
}

impl CacheControl {
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Parse from header name/value pairs; names match case-insensitively,
    /// unknown values fall back to the defaults.
    pub fn from_headers<'a, I>(headers_iter: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut control = Self::default();
        for (name, value) in headers_iter {
            match name.to_ascii_lowercase().as_str() {
                headers::CACHE_BYPASS => {
                    control.bypass = parse_bool(value, control.bypass);
                }
                headers::CACHE_STORE => {
                    control.store = parse_bool(value, control.store);
                }
                headers::CACHE_MODE => {
                    control.mode = parse_mode(value);
                }
                headers::MODEL_COMPAT => {
                    control.model_compat = parse_model_compat(value);
                }
                headers::EXPERIMENT => {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        control.experiment = Some(trimmed.to_string());
                    }
                }
                _ => {}
            }
        }
        control
    }

    pub fn should_lookup(&self) -> bool {
        !self.bypass
    }

    pub fn use_exact(&self) -> bool {
        matches!(self.mode, CacheLookupMode::Exact | CacheLookupMode::Both)
    }

    pub fn use_template(&self) -> bool {
        matches!(self.mode, CacheLookupMode::Template | CacheLookupMode::Both)
    }
}

/// Accepts true/false, 1/0, yes/no, on/off, case-insensitively.
fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        other => {
            tracing::warn!(value = other, "invalid boolean header value, using default");
            default
        }
    }
}

fn parse_mode(value: &str) -> CacheLookupMode {
    match value.trim().to_ascii_lowercase().as_str() {
        "exact" => CacheLookupMode::Exact,
        "template" => CacheLookupMode::Template,
        "both" => CacheLookupMode::Both,
        other => {
            tracing::warn!(value = other, "invalid cache mode header, using both");
            CacheLookupMode::Both
        }
    }
}

fn parse_model_compat(value: &str) -> ModelCompatPolicy {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => ModelCompatPolicy::Strict,
        "family" => ModelCompatPolicy::Family,
        "any" => ModelCompatPolicy::Any,
        other => {
            tracing::warn!(value = other, "invalid model compat header, using strict");
            ModelCompatPolicy::Strict
        }
    }
}
