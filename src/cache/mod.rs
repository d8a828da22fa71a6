//! Retrieval cache module
//!
//! Memoizes index lookups keyed by canonical `(query, top_k, filters)`
//! with TTL freshness and LRU capacity eviction.

pub mod clock;
pub mod key;
pub mod store;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{normalize_query, CacheKey};
pub use store::{CacheEntry, CacheStats, RetrievalCache, DEFAULT_CAPACITY, DEFAULT_TTL};
