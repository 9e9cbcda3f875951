//! 弹性模块：熔断器与降级矩阵。
//!
//! # Resilience Module
//!
//! Every external dependency (hot tier, indexed tier, embedder, upstream
//! provider) is wrapped by a [`CircuitBreaker`]; the combined breaker states
//! select a [`DegradationMode`] that is stamped on responses via provenance.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CircuitBreaker`] | Three-state breaker with failure-rate and slow-call windows |
//! | [`CircuitBreakerConfig`] | Per-dependency thresholds and cooldowns |
//! | [`CircuitState`] | Closed / Open / Half-Open snapshot |
//! | [`DependencyBreakers`] | The four per-dependency breakers as one unit |
//! | [`DegradationMode`] | Which cache paths remain available |
//!
//! The cache path is non-fatal: a tripped breaker redirects traffic to the
//! surviving tier instead of surfacing errors to the client.

mod circuit_breaker;
mod degradation;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use degradation::{DegradationMode, DependencyBreakers};
