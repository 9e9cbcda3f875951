//! 存储模块：双层缓存存储（精确层与模板层）。
//!
//! # Two-Tier Store Module
//!
//! The engine owns two stores abstracted behind traits so either may be
//! swapped for a networked implementation.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`HotStore`] | Exact tier: `(tenant, exact_key)` → compressed response |
//! | [`IndexedStore`] | Template tier: persisted [`CacheEntry`] rows with SimHash and vector lookups |
//! | [`MemoryHotStore`] | In-process hot tier with TTL and approximate-LFU eviction |
//! | [`MemoryIndexedStore`] | In-process template tier with the same ordering semantics a relational/vector-extension tier provides |
//! | [`CacheEntry`] | The persisted row (keys, fingerprints, blobs, stats, flags) |
//!
//! A production deployment points [`HotStore`] at a key/value service and
//! [`IndexedStore`] at a relational store with a vector extension (unique
//! `(tenant, exact_key)`, `(tenant, simhash)`, `(tenant, model, mode)`
//! indexes, a partial index on `expires_at`, and a cosine-distance ANN index
//! over `embedding`; an IVF index with ~100 lists fits the scale). The
//! in-memory implementations exist for tests, development and single-node
//! deployments, and define the reference semantics.

mod entry;
mod hot;
mod indexed;
mod memory;

pub use entry::CacheEntry;
pub use hot::{CacheMetadata, CachedResponse, HotStore, MemoryHotStore, NullHotStore};
pub use indexed::{CandidateQuery, IndexedStore, ModelFilter};
pub use memory::MemoryIndexedStore;
