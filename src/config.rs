//! Proxy configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration for the proxy core.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub providers: HashMap<String, ProviderSettings>,
    pub cache: CacheSettings,
    pub timeouts: TimeoutSettings,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_provider(mut self, name: impl Into<String>, settings: ProviderSettings) -> Self {
        self.providers.insert(name.into(), settings);
        self
    }
}

/// One upstream provider endpoint.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            enabled: true,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

/// Cache behavior knobs.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Whether the template tier participates in lookups.
    pub template_matching: bool,
    /// Composite-score admission threshold τ.
    pub similarity_threshold: f64,
    /// Maximum SimHash Hamming distance for candidate fetches.
    pub hamming_threshold: u32,
    /// Candidate fetch limit.
    pub candidate_limit: usize,
    /// TTL applied when no per-family override matches.
    pub default_ttl: Duration,
    /// Per-model-family TTL overrides, keyed by family string.
    pub model_family_ttl: HashMap<String, Duration>,
    /// Hot-tier entry bound before approximate-LFU eviction kicks in.
    pub max_hot_entries: usize,
    /// When on, the raw prompt never persists: stored request blobs carry
    /// masked message contents and only the keyed digest survives.
    pub privacy_mode: bool,
    /// Secret keying the raw-prompt digest.
    pub digest_secret: Option<String>,
    pub tenant: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            template_matching: true,
            similarity_threshold: 0.87,
            hamming_threshold: 6,
            candidate_limit: 100,
            default_ttl: Duration::from_secs(24 * 3600),
            model_family_ttl: HashMap::new(),
            max_hot_entries: 10_000,
            privacy_mode: false,
            digest_secret: None,
            tenant: "default".to_string(),
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_hamming_threshold(mut self, threshold: u32) -> Self {
        self.hamming_threshold = threshold;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_family_ttl(mut self, family: impl Into<String>, ttl: Duration) -> Self {
        self.model_family_ttl.insert(family.into(), ttl);
        self
    }

    pub fn with_template_matching(mut self, enabled: bool) -> Self {
        self.template_matching = enabled;
        self
    }

    pub fn with_privacy_mode(mut self, enabled: bool) -> Self {
        self.privacy_mode = enabled;
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    /// TTL for a model family, falling back to the default.
    pub fn ttl_for_family(&self, family: &str) -> Duration {
        self.model_family_ttl
            .get(family)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Per-dependency timeouts. Exhaustion registers as a breaker failure.
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    pub hot_store: Duration,
    pub indexed_store: Duration,
    pub embedder: Duration,
    pub upstream: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            hot_store: Duration::from_secs(5),
            indexed_store: Duration::from_secs(10),
            embedder: Duration::from_secs(2),
            upstream: Duration::from_secs(60),
        }
    }
}
