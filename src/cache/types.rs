//! Core type definitions for the cache

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type, produced by [`crate::cache::cache_key`]
pub type CacheKey = String;

/// Point-in-time snapshot of the cache
///
/// `total`, `valid` and `expired` come from a scan at the time of the call.
/// Expired entries are counted, not removed.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored, live or not
    pub total: usize,

    /// Entries that are still live
    pub valid: usize,

    /// Entries past their TTL that have not been read since
    pub expired: usize,

    /// Capacity bound
    pub max_size: usize,

    /// Cumulative `get`/`has` hits
    pub hits: u64,

    /// Cumulative `get`/`has` misses, including lazy expiries
    pub misses: u64,

    /// Cumulative capacity evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ total: {}, valid: {}, expired: {}, max_size: {}, hit_rate: {:.2}%, evictions: {} }}",
            self.total,
            self.valid,
            self.expired,
            self.max_size,
            self.hit_rate(),
            self.evictions
        )
    }
}
