//! 评分模块：候选评分与准入护栏。
//!
//! # Scoring & Guardrails Module
//!
//! Guardrails run strictly before scoring: a candidate that fails any gate
//! is dropped silently, whatever its similarity. Surviving candidates are
//! ranked by a composite of semantic, structural, parameter and recency
//! signals, with the semantic component dominant: a structurally identical
//! masked template that points at a different concrete URL or identifier is
//! the principal false-positive risk, and only the embedding can tell those
//! apart.

mod guardrails;
mod scorer;

pub use guardrails::{Guardrails, RejectReason};
pub use scorer::{CompositeScorer, ScoreBreakdown, ScoredCandidate};
