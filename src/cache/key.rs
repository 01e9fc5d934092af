//! Deterministic cache key construction
//!
//! Keys have the shape `prefix:k1:v1|k2:v2` where parameter names are sorted
//! lexicographically and every value is JSON encoded. Two logically identical
//! queries always produce the same key no matter in which order their
//! parameters were supplied.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::cache::types::CacheKey;

/// Build a key from a namespace prefix and a parameter object
pub fn cache_key(prefix: &str, params: &Map<String, Value>) -> CacheKey {
    let sorted: BTreeMap<&str, &Value> = params.iter().map(|(k, v)| (k.as_str(), v)).collect();
    render(prefix, sorted)
}

fn render<'a, K, I>(prefix: &str, sorted: I) -> CacheKey
where
    K: AsRef<str> + 'a,
    I: IntoIterator<Item = (K, &'a Value)>,
{
    let parts: Vec<String> = sorted
        .into_iter()
        .map(|(k, v)| format!("{}:{}", k.as_ref(), v))
        .collect();

    format!("{}:{}", prefix, parts.join("|"))
}

/// Fluent builder over [`cache_key`]
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    prefix: String,
    params: BTreeMap<String, Value>,
}

impl CacheKeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter; a repeated name overwrites the earlier value
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> CacheKey {
        render(&self.prefix, self.params.iter())
    }
}
