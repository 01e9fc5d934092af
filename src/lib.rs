//! # sayso-fetch
//!
//! Request caching and parallel fetch layer for the sayso data API.
//!
//! ## Features
//!
//! - Bounded, TTL-based query cache with deterministic keys
//! - Parallel, batched, prioritized and streamed query execution
//! - Timeouts that abandon slow queries without cancelling them
//! - Retry with exponential backoff
//! - Cache-first business aggregates assembled from parallel queries
//! - PostgREST client with a round-robin handle pool
//!
//! ## Fetching a business
//!
//! ```no_run
//! use std::sync::Arc;
//! use sayso_fetch::{BusinessFetcher, CacheConfig, ClientConfig, ClientPool, QueryCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let pool = Arc::new(ClientPool::postgrest(&config)?);
//!     let cache = Arc::new(QueryCache::new(CacheConfig::default())?);
//!
//!     let fetcher = BusinessFetcher::new(cache, pool);
//!     let business = fetcher.fetch_business("biz-1", true).await?;
//!     println!("{} reviews", business.reviews.len());
//!
//!     // after a write that touches the business
//!     fetcher.invalidate_business_cache(Some("biz-1")).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Running queries side by side
//!
//! ```
//! use sayso_fetch::executor::execute_parallel_queries;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let tasks = (1..=3).map(|n| move || async move { Ok::<_, sayso_fetch::FetchError>(n * 10) });
//! let results = execute_parallel_queries(tasks).await;
//!
//! let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
//! assert_eq!(values, vec![10, 20, 30]);
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;

// Re-export main types for convenience
pub use cache::{cache_key, CacheConfig, CacheConfigBuilder, CacheKey, CacheKeyBuilder, CacheStats, QueryCache};
pub use client::{ClientFactory, ClientPool, DataClient, PostgrestClient, RequestContext, SelectQuery};
pub use config::ClientConfig;
pub use error::{FetchError, Result};
pub use executor::{QueryResult, RetryPolicy};
pub use fetch::{business_cache_key, BusinessAggregate, BusinessFetcher, FetchConfig, ReviewWithRelations};
