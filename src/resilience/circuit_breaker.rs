//! Windowed three-state circuit breaker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Breaker thresholds. Presets exist for each dependency class.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate over the sampled window that trips the breaker.
    pub failure_rate_threshold: f64,
    /// Slow-call rate over the sampled window that trips the breaker.
    pub slow_call_rate_threshold: f64,
    /// Calls slower than this count as slow.
    pub slow_call_duration: Duration,
    /// Minimum sampled calls before rates are evaluated.
    pub min_samples: usize,
    /// Sliding window capacity.
    pub window_size: usize,
    /// How long the breaker stays open before probing.
    pub open_cooldown: Duration,
    /// Trial calls permitted while half-open.
    pub half_open_max_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            slow_call_rate_threshold: 0.5,
            slow_call_duration: Duration::from_secs(2),
            min_samples: 10,
            window_size: 32,
            open_cooldown: Duration::from_secs(30),
            half_open_max_calls: 5,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.open_cooldown = cooldown;
        self
    }

    pub fn with_min_samples(mut self, samples: usize) -> Self {
        self.min_samples = samples;
        self
    }

    /// Hot-tier preset: 50% failure rate, 10 s cooldown.
    pub fn hot_tier() -> Self {
        Self::new().with_cooldown(Duration::from_secs(10))
    }

    /// Indexed-tier preset: 50% failure rate, 30 s cooldown.
    pub fn indexed_tier() -> Self {
        Self::new().with_cooldown(Duration::from_secs(30))
    }

    /// Embedder preset: 50% failure rate, 30 s cooldown.
    pub fn embedder() -> Self {
        Self::new().with_cooldown(Duration::from_secs(30))
    }

    /// Upstream provider preset: 80% failure rate, 60 s cooldown.
    pub fn provider() -> Self {
        Self::new()
            .with_failure_rate(0.8)
            .with_cooldown(Duration::from_secs(60))
    }
}

/// Snapshot of the breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    failed: bool,
    slow: bool,
}

#[derive(Debug)]
enum State {
    Closed,
    Open { until: Instant },
    HalfOpen { permitted: usize, successes: usize },
}

struct Inner {
    state: State,
    window: VecDeque<Outcome>,
}

/// Three-state circuit breaker.
///
/// Closed → Open when the failure rate or the slow-call rate over a sliding
/// window of at least `min_samples` calls exceeds its threshold. Open →
/// Half-Open after the cooldown. Half-Open admits up to
/// `half_open_max_calls` trials: all succeeding closes the breaker, any
/// failure reopens it.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: VecDeque::new(),
            }),
        }
    }

    /// Whether a call may proceed right now. Half-open permits are consumed
    /// by this check.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::Open { until } => {
                if Instant::now() < until {
                    false
                } else {
                    inner.state = State::HalfOpen {
                        permitted: 1,
                        successes: 0,
                    };
                    true
                }
            }
            State::HalfOpen {
                ref mut permitted, ..
            } => {
                if *permitted < self.config.half_open_max_calls {
                    *permitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.record(Outcome {
            failed: false,
            slow: elapsed >= self.config.slow_call_duration,
        });
    }

    pub fn record_failure(&self) {
        self.record(Outcome {
            failed: true,
            slow: false,
        });
    }

    fn record(&self, outcome: Outcome) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::HalfOpen {
                ref mut successes, ..
            } => {
                if outcome.failed || outcome.slow {
                    self.trip(&mut inner);
                } else {
                    *successes += 1;
                    if *successes >= self.config.half_open_max_calls {
                        inner.state = State::Closed;
                        inner.window.clear();
                    }
                }
            }
            State::Closed => {
                inner.window.push_back(outcome);
                while inner.window.len() > self.config.window_size {
                    inner.window.pop_front();
                }
                if self.rates_exceeded(&inner.window) {
                    self.trip(&mut inner);
                }
            }
            // Late results from calls admitted before the trip.
            State::Open { .. } => {}
        }
    }

    fn rates_exceeded(&self, window: &VecDeque<Outcome>) -> bool {
        if window.len() < self.config.min_samples {
            return false;
        }
        let total = window.len() as f64;
        let failures = window.iter().filter(|o| o.failed).count() as f64;
        let slow = window.iter().filter(|o| o.slow).count() as f64;
        failures / total >= self.config.failure_rate_threshold
            || slow / total >= self.config.slow_call_rate_threshold
    }

    fn trip(&self, inner: &mut Inner) {
        inner.state = State::Open {
            until: Instant::now() + self.config.open_cooldown,
        };
        inner.window.clear();
    }

    /// Non-consuming state snapshot for health reporting.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.state {
            State::Closed => CircuitState::Closed,
            State::Open { until } => {
                if Instant::now() < until {
                    CircuitState::Open
                } else {
                    CircuitState::HalfOpen
                }
            }
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Whether the dependency is considered up (calls may be attempted).
    pub fn is_available(&self) -> bool {
        self.state() != CircuitState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_min_samples(4)
            .with_cooldown(Duration::from_millis(50))
    }

    #[test]
    fn test_initially_closed() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow());
    }

    #[test]
    fn test_opens_on_failure_rate() {
        let cb = CircuitBreaker::new(quick_config());
        for _ in 0..2 {
            cb.record_success(Duration::from_millis(1));
        }
        for _ in 0..2 {
            cb.record_failure();
        }
        // 2/4 failures >= 50%
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn test_stays_closed_below_min_samples() {
        let cb = CircuitBreaker::new(quick_config());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_opens_on_slow_calls() {
        let cb = CircuitBreaker::new(quick_config());
        for _ in 0..4 {
            cb.record_success(Duration::from_secs(3));
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_probe_then_close() {
        let cb = CircuitBreaker::new(quick_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        assert!(!cb.allow());

        std::thread::sleep(Duration::from_millis(60));
        // Cooldown elapsed: trial calls admitted, capped at five.
        for _ in 0..5 {
            assert!(cb.allow());
        }
        assert!(!cb.allow());
        for _ in 0..5 {
            cb.record_success(Duration::from_millis(1));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(quick_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn test_provider_preset_tolerates_more_failures() {
        let config = CircuitBreakerConfig::provider().with_min_samples(10);
        let cb = CircuitBreaker::new(config);
        for _ in 0..3 {
            cb.record_success(Duration::from_millis(1));
        }
        for _ in 0..7 {
            cb.record_failure();
        }
        // 70% < 80% threshold
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        // 10/13 ≈ 77%... push until over threshold
        for _ in 0..8 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
