//! # Query Cache
//!
//! Process-local memoization of query results, keyed by deterministic
//! strings built from a namespace prefix and a parameter map.
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: per-entry TTL, checked lazily on read
//! - **Bounded Size**: oldest entry is evicted when capacity is reached
//! - **Prefix Invalidation**: drop a whole namespace such as `business:`
//! - **Diagnostics**: `stats()` classifies entries without mutating them
//!
//! ## Example
//!
//! ```rust
//! use sayso_fetch::cache::{CacheConfig, CacheKeyBuilder, QueryCache};
//! use std::time::Duration;
//!
//! # async fn example() -> sayso_fetch::Result<()> {
//! let cache = QueryCache::new(CacheConfig::default())?;
//!
//! let key = CacheKeyBuilder::new("business").param("id", "biz-1").build();
//! cache.set(key.clone(), &"cached row", Some(Duration::from_secs(300))).await?;
//!
//! if let Some(value) = cache.get::<String>(&key).await? {
//!     println!("Cache hit: {}", value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod key;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use key::{cache_key, CacheKeyBuilder};
pub use store::QueryCache;
pub use types::{CacheKey, CacheStats};
