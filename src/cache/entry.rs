//! Cache entry with creation time and TTL

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::cache::types::CacheKey;

/// A single cached query result
///
/// Entries are never updated in place; `set` on an existing key replaces the
/// whole entry, which also resets its age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached payload
    pub value: Value,

    /// When the entry was stored
    pub stored_at: DateTime<Utc>,

    /// Time-to-live measured from `stored_at`
    pub ttl: Duration,

    /// Insertion counter, breaks `stored_at` ties during eviction
    pub sequence: u64,
}

impl CacheEntry {
    pub fn new(key: CacheKey, value: Value, ttl: Duration, sequence: u64) -> Self {
        Self {
            key,
            value,
            stored_at: Utc::now(),
            ttl,
            sequence,
        }
    }

    /// Live iff `now - stored_at <= ttl`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now - self.stored_at <= ttl,
            // TTL too large to represent, never expires
            Err(_) => true,
        }
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }

    pub fn is_expired(&self) -> bool {
        !self.is_live()
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.stored_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Eviction ordering key: oldest `stored_at` first, then insertion order
    pub(crate) fn eviction_rank(&self) -> (DateTime<Utc>, u64) {
        (self.stored_at, self.sequence)
    }
}
