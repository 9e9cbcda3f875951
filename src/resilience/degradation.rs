//! Degradation mode selection from combined breaker states.

use std::sync::Arc;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Which cache paths remain available given dependency health.
///
/// | hot | indexed | embedder | mode |
/// |-----|---------|----------|------|
/// | up  | up      | up       | full |
/// | up  | down    | *        | exact-only |
/// | down| up      | up       | template-only |
/// | down| up      | down     | template-without-semantic |
/// | down| down    | *        | passthrough |
///
/// With the embedder down but both tiers up, the template path runs without
/// its semantic signal (threshold raised) while the exact path stays on; the
/// stamped reason reflects the template-path degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationMode {
    Full,
    ExactOnly,
    TemplateOnly,
    /// Structural + param + recency scoring only; admission threshold is
    /// raised by 0.05.
    TemplateWithoutSemantic,
    Passthrough,
}

impl DegradationMode {
    pub fn derive(hot_up: bool, indexed_up: bool, embedder_up: bool) -> Self {
        match (hot_up, indexed_up, embedder_up) {
            (true, true, true) => DegradationMode::Full,
            (true, false, _) => DegradationMode::ExactOnly,
            (false, true, true) => DegradationMode::TemplateOnly,
            (_, true, false) => DegradationMode::TemplateWithoutSemantic,
            (false, false, _) => DegradationMode::Passthrough,
        }
    }

    pub fn is_degraded(&self) -> bool {
        *self != DegradationMode::Full
    }

    /// Value for the `x-cache-degraded-reason` header.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            DegradationMode::Full => None,
            DegradationMode::ExactOnly => Some("exact-only"),
            DegradationMode::TemplateOnly => Some("template-only"),
            DegradationMode::TemplateWithoutSemantic => Some("template-without-semantic"),
            DegradationMode::Passthrough => Some("passthrough"),
        }
    }

    /// Extra admission threshold applied when semantic scoring is missing.
    pub fn threshold_adjustment(&self) -> f64 {
        match self {
            DegradationMode::TemplateWithoutSemantic => 0.05,
            _ => 0.0,
        }
    }
}

/// The four per-dependency breakers as one injectable unit.
pub struct DependencyBreakers {
    pub hot: Arc<CircuitBreaker>,
    pub indexed: Arc<CircuitBreaker>,
    pub embedder: Arc<CircuitBreaker>,
    pub upstream: Arc<CircuitBreaker>,
}

impl DependencyBreakers {
    pub fn new() -> Self {
        Self {
            hot: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::hot_tier())),
            indexed: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::indexed_tier())),
            embedder: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::embedder())),
            upstream: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::provider())),
        }
    }

    /// Current degradation mode from live breaker states.
    pub fn degradation(&self) -> DegradationMode {
        DegradationMode::derive(
            self.hot.is_available(),
            self.indexed.is_available(),
            self.embedder.is_available(),
        )
    }

    /// Per-dependency states for health reporting.
    pub fn health(&self) -> Vec<(&'static str, CircuitState)> {
        vec![
            ("hot_store", self.hot.state()),
            ("indexed_store", self.indexed.state()),
            ("embedder", self.embedder.state()),
            ("upstream", self.upstream.state()),
        ]
    }
}

impl Default for DependencyBreakers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix() {
        use DegradationMode::*;
        assert_eq!(DegradationMode::derive(true, true, true), Full);
        assert_eq!(DegradationMode::derive(true, false, true), ExactOnly);
        assert_eq!(DegradationMode::derive(true, false, false), ExactOnly);
        assert_eq!(DegradationMode::derive(false, true, true), TemplateOnly);
        assert_eq!(
            DegradationMode::derive(false, true, false),
            TemplateWithoutSemantic
        );
        assert_eq!(DegradationMode::derive(false, false, true), Passthrough);
        assert_eq!(DegradationMode::derive(false, false, false), Passthrough);
    }

    #[test]
    fn test_reasons_and_threshold() {
        assert_eq!(DegradationMode::Full.reason(), None);
        assert!(!DegradationMode::Full.is_degraded());
        assert_eq!(
            DegradationMode::Passthrough.reason(),
            Some("passthrough")
        );
        assert_eq!(
            DegradationMode::TemplateWithoutSemantic.threshold_adjustment(),
            0.05
        );
        assert_eq!(DegradationMode::TemplateOnly.threshold_adjustment(), 0.0);
    }

    #[test]
    fn test_breakers_default_to_full() {
        let breakers = DependencyBreakers::new();
        assert_eq!(breakers.degradation(), DegradationMode::Full);
        assert_eq!(breakers.health().len(), 4);
    }
}
