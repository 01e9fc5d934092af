//! Query cache store with lazy TTL expiry and oldest-entry eviction

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    types::{CacheKey, CacheStats},
};
use crate::error::{FetchError, Result};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Bounded in-memory cache of query results
///
/// - Entries expire lazily: a `get` or `has` on an expired entry removes it
///   and reports a miss. Nothing sweeps in the background.
/// - When a new key would push the cache past `max_entries`, the entry with
///   the oldest `stored_at` is evicted. Reads do not refresh age, so this is
///   weaker than LRU.
/// - All state sits behind a single lock, including the removals that reads
///   perform.
#[derive(Debug)]
pub struct QueryCache {
    config: CacheConfig,
    store: RwLock<CacheStore>,
}

#[derive(Debug)]
struct CacheStore {
    entries: HashMap<CacheKey, CacheEntry>,
    next_sequence: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::with_valid_config(CacheConfig::default())
    }
}

impl QueryCache {
    /// Create a cache, rejecting an invalid configuration
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate().map_err(FetchError::Config)?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: CacheConfig) -> Self {
        info!(
            "Initializing query cache (max_entries: {}, default_ttl: {:?})",
            config.max_entries, config.default_ttl
        );

        Self {
            config,
            store: RwLock::new(CacheStore {
                entries: HashMap::new(),
                next_sequence: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the live value stored under `key`
    ///
    /// A stored value that no longer deserializes as `T` is reported as a
    /// serialization error and left in place.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Get the live JSON payload stored under `key`
    pub async fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        let mut store = self.store.write().await;
        let value = self.live_entry(&mut store, key).map(|entry| entry.value.clone());
        self.record_lookup(&mut store, key, value.is_some());
        value
    }

    /// Same liveness rules as `get`, without returning the value
    pub async fn has(&self, key: &str) -> bool {
        let mut store = self.store.write().await;
        let live = self.live_entry(&mut store, key).is_some();
        self.record_lookup(&mut store, key, live);
        live
    }

    /// Insert or replace an entry
    ///
    /// `ttl` of `None` uses the configured default.
    pub async fn set<T: Serialize>(&self, key: impl Into<CacheKey>, value: &T, ttl: Option<Duration>) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_raw(key.into(), value, ttl).await;
        Ok(())
    }

    /// Insert or replace an already-encoded payload
    pub async fn set_raw(&self, key: CacheKey, value: serde_json::Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| self.config.ttl_with_jitter());
        let mut store = self.store.write().await;

        if !store.entries.contains_key(&key) && store.entries.len() >= self.config.max_entries {
            self.evict_oldest(&mut store);
        }

        let sequence = store.next_sequence;
        store.next_sequence += 1;

        debug!("Caching {} (ttl: {:?})", key, ttl);
        let entry = CacheEntry::new(key.clone(), value, ttl, sequence);
        store.entries.insert(key, entry);
    }

    /// Remove one entry; absent keys are ignored
    pub async fn delete(&self, key: &str) {
        let mut store = self.store.write().await;
        if store.entries.remove(key).is_some() {
            debug!("Removed cache entry: {}", key);
        }
    }

    /// Remove every entry whose key starts with `prefix`
    pub async fn delete_by_prefix(&self, prefix: &str) -> usize {
        let mut store = self.store.write().await;
        let before = store.entries.len();
        store.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - store.entries.len();

        info!("Invalidated {} entries with prefix: {}", removed, prefix);
        removed
    }

    /// Remove everything
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        let count = store.entries.len();
        store.entries.clear();
        info!("Cleared {} entries from cache", count);
    }

    /// Remove all expired entries now
    ///
    /// Only runs when called; the cache never schedules this itself.
    pub async fn purge_expired(&self) -> usize {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let before = store.entries.len();
        store.entries.retain(|_, entry| entry.is_live_at(now));
        let removed = before - store.entries.len();

        if removed > 0 {
            debug!("Purged {} expired entries", removed);
        }
        removed
    }

    /// Scan and classify entries without evicting anything
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        let now = Utc::now();
        let valid = store.entries.values().filter(|e| e.is_live_at(now)).count();

        CacheStats {
            total: store.entries.len(),
            valid,
            expired: store.entries.len() - valid,
            max_size: self.config.max_entries,
            hits: store.hits,
            misses: store.misses,
            evictions: store.evictions,
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    /// Cache-aside helper
    ///
    /// Returns the live value when present; otherwise awaits `loader`, caches
    /// an `Ok` result under `key` and returns it. Errors are returned as-is and
    /// never cached. Concurrent misses on the same key each run the loader.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get::<T>(key).await? {
            return Ok(hit);
        }

        let value = loader().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }

    /// Internal: return the entry if live, dropping it if expired
    fn live_entry<'a>(&self, store: &'a mut CacheStore, key: &str) -> Option<&'a CacheEntry> {
        let expired = match store.entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(),
        };

        if expired {
            debug!("Cache entry expired: {}", key);
            store.entries.remove(key);
            return None;
        }

        store.entries.get(key)
    }

    fn record_lookup(&self, store: &mut CacheStore, key: &str, hit: bool) {
        if hit {
            debug!("Cache hit: {}", key);
        } else {
            debug!("Cache miss: {}", key);
        }

        if self.config.enable_metrics {
            if hit {
                store.hits += 1;
            } else {
                store.misses += 1;
            }
        }
    }

    /// Internal: O(n) scan for the oldest entry
    fn evict_oldest(&self, store: &mut CacheStore) {
        let oldest = store
            .entries
            .values()
            .min_by_key(|entry| entry.eviction_rank())
            .map(|entry| entry.key.clone());

        if let Some(key) = oldest {
            debug!("Evicting oldest entry due to max_entries limit: {}", key);
            store.entries.remove(&key);
            if self.config.enable_metrics {
                store.evictions += 1;
            }
        }
    }
}
