//! Two-tier TTL cache for provider responses
//!
//! Entries live in a fast in-memory tier backed by an optional durable tier.
//! Expired entries are treated as absent by `get` and deleted lazily, while
//! `peek` still hands them out (flagged as expired) so callers can degrade
//! gracefully when every provider is unavailable.

mod manager;
mod store;

pub use manager::{CacheError, CacheHit, CachedData, TtlCache, DEFAULT_TTL};
pub use store::{DiskStore, DurableStore, MemoryStore, StoreError};
