//! Cache control and provenance header vocabulary.
//!
//! Request headers let clients steer cache behavior per call; response
//! headers make every served response auditable: what matched, how well,
//! which entry, and whether the cache was degraded at the time.

use super::MatchType;

// ---------- Request control headers ----------

/// Bypass cache lookup (always forward to provider). "true"/"false".
pub const CACHE_BYPASS: &str = "x-cache-bypass";

/// Whether the response may be stored. "false" skips write-through.
pub const CACHE_STORE: &str = "x-cache-store";

/// Restrict lookup tiers: "exact", "template" or "both".
pub const CACHE_MODE: &str = "x-cache-mode";

/// Model guardrail override: "strict", "family" or "any".
pub const MODEL_COMPAT: &str = "x-model-compat";

/// Opaque experiment tag carried through for downstream analysis.
pub const EXPERIMENT: &str = "x-cache-experiment";

// ---------- Response provenance headers ----------

pub const CACHE_HIT: &str = "x-cache-hit";
pub const CACHE_MATCH: &str = "x-cache-match";
/// Composite score, 3 decimals. Exact hits report 1.000.
pub const CACHE_SCORE: &str = "x-cache-score";
/// UUID of the serving template entry.
pub const CACHE_PROVENANCE: &str = "x-cache-provenance";
/// Model that originally produced the cached response.
pub const CACHE_SOURCE_MODEL: &str = "x-cache-source-model";
/// Age of the cached entry in seconds.
pub const CACHE_AGE: &str = "x-cache-age";
pub const CACHE_DEGRADED: &str = "x-cache-degraded";
pub const CACHE_DEGRADED_REASON: &str = "x-cache-degraded-reason";

/// Provenance stamped on every response. The ingress layer turns this into
/// the `x-cache-*` response headers.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub hit: bool,
    pub match_type: MatchType,
    pub score: f64,
    pub entry_id: Option<String>,
    pub source_model: Option<String>,
    pub age_seconds: Option<i64>,
    pub degraded: bool,
    pub degraded_reason: Option<&'static str>,
}

impl Provenance {
    pub fn miss() -> Self {
        Self {
            hit: false,
            match_type: MatchType::None,
            score: 0.0,
            entry_id: None,
            source_model: None,
            age_seconds: None,
            degraded: false,
            degraded_reason: None,
        }
    }

    pub fn with_degradation(mut self, reason: Option<&'static str>) -> Self {
        self.degraded = reason.is_some();
        self.degraded_reason = reason;
        self
    }

    /// Header name/value pairs in emission order.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (CACHE_HIT, self.hit.to_string()),
            (CACHE_MATCH, self.match_type.as_str().to_string()),
        ];
        if self.hit {
            out.push((CACHE_SCORE, format!("{:.3}", self.score)));
            if let Some(ref id) = self.entry_id {
                out.push((CACHE_PROVENANCE, id.clone()));
            }
            if let Some(ref model) = self.source_model {
                out.push((CACHE_SOURCE_MODEL, model.clone()));
            }
            if let Some(age) = self.age_seconds {
                out.push((CACHE_AGE, age.to_string()));
            }
        }
        if self.degraded {
            out.push((CACHE_DEGRADED, "true".to_string()));
            if let Some(reason) = self.degraded_reason {
                out.push((CACHE_DEGRADED_REASON, reason.to_string()));
            }
        }
        out
    }
}
