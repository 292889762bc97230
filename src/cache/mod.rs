//! Durable response cache partitioned into named generations.
//!
//! This module provides the store the offline worker manages:
//! - One generation per deployed version label
//! - Entries keyed by request method + URL, with optional query-insensitive lookup
//! - Last-writer-wins overwrites with no multi-key transactions

mod memory;
mod storage;
mod traits;

pub use memory::MemoryStore;
pub use storage::SqliteStore;
pub use traits::{CacheStore, CachedResponse, MatchOptions};
