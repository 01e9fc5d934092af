//! Cached, parallel business fetches
//!
//! [`BusinessFetcher`] ties the query cache, the executor strategies and a
//! client factory together:
//!
//! ```text
//! fetch_business(id)
//!   ├─ cache hit ──────────────────────────────► aggregate
//!   └─ miss
//!       ├─ wave 1 (parallel, retried): business · reviews · stats
//!       ├─ business missing/failed ────────────► error
//!       ├─ wave 2 (parallel): review_images · profiles
//!       ├─ join in memory
//!       └─ cache for 5 minutes ────────────────► aggregate
//! ```
//!
//! Failures of anything but the business row degrade to missing data.

pub mod types;

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CacheKeyBuilder, QueryCache};
use crate::client::{ClientFactory, DataClient, RequestContext, SelectQuery};
use crate::error::{FetchError, Result};
use crate::executor::{
    batch_fetch_by_column, batch_fetch_by_ids, execute_parallel_queries, QueryResult, RetryPolicy,
    DEFAULT_ID_CHUNK_SIZE,
};

pub use types::{BusinessAggregate, ReviewWithRelations};

/// Cache namespace for business aggregates
pub const BUSINESS_PREFIX: &str = "business";

/// Key under which a business aggregate is cached
pub fn business_cache_key(id: &str) -> CacheKey {
    CacheKeyBuilder::new(BUSINESS_PREFIX).param("id", id).build()
}

/// Table names used by the fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub businesses: String,
    pub reviews: String,
    pub business_stats: String,
    pub review_images: String,
    pub profiles: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            businesses: "businesses".to_string(),
            reviews: "reviews".to_string(),
            business_stats: "business_stats".to_string(),
            review_images: "review_images".to_string(),
            profiles: "profiles".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// TTL of cached business aggregates
    pub business_ttl: Duration,
    /// Number of most recent reviews joined into an aggregate
    pub review_limit: usize,
    /// Backoff applied to each first-wave query
    pub retry: RetryPolicy,
    /// Ids per `in (...)` query
    pub id_chunk_size: usize,
    pub tables: TableNames,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            business_ttl: Duration::from_millis(300_000),
            review_limit: 20,
            retry: RetryPolicy::default(),
            id_chunk_size: DEFAULT_ID_CHUNK_SIZE,
            tables: TableNames::default(),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id_chunk_size == 0 {
            return Err(FetchError::Config("id_chunk_size must be greater than 0".to_string()));
        }
        if self.business_ttl.is_zero() {
            return Err(FetchError::Config("business_ttl must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Cache-first business reads with parallel joins
pub struct BusinessFetcher {
    cache: Arc<QueryCache>,
    clients: Arc<dyn ClientFactory>,
    config: FetchConfig,
}

impl BusinessFetcher {
    pub fn new(cache: Arc<QueryCache>, clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            cache,
            clients,
            config: FetchConfig::default(),
        }
    }

    /// Fetcher with custom tuning, rejecting an invalid configuration
    pub fn with_config(cache: Arc<QueryCache>, clients: Arc<dyn ClientFactory>, config: FetchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { cache, clients, config })
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch one business with its stats and recent reviews
    ///
    /// Each first-wave query is retried with the configured backoff, but only
    /// for transient errors: 4xx responses from the collaborator fail at once.
    pub async fn fetch_business(&self, id: &str, use_cache: bool) -> Result<BusinessAggregate> {
        self.fetch_business_with_context(&RequestContext::default(), id, use_cache)
            .await
    }

    pub async fn fetch_business_with_context(
        &self,
        ctx: &RequestContext,
        id: &str,
        use_cache: bool,
    ) -> Result<BusinessAggregate> {
        let key = business_cache_key(id);

        if use_cache {
            if let Some(cached) = self.cached_aggregate(&key).await {
                debug!("Serving business {} from cache", id);
                return Ok(cached);
            }
        }

        let tables = &self.config.tables;
        let clients = self.clients.acquire_many(3, ctx).await?;

        let queries = [
            SelectQuery::from(tables.businesses.as_str()).eq("id", id).single(),
            SelectQuery::from(tables.reviews.as_str())
                .eq("business_id", id)
                .order("created_at", true)
                .range(0, self.config.review_limit.saturating_sub(1)),
            SelectQuery::from(tables.business_stats.as_str())
                .eq("business_id", id)
                .single(),
        ];

        let results = execute_parallel_queries(
            clients
                .iter()
                .zip(queries.iter())
                .map(|(client, query)| move || self.select_with_retry(client.as_ref(), query, ctx)),
        )
        .await;

        let [business, reviews, stats]: [QueryResult<Vec<Value>>; 3] = results
            .try_into()
            .map_err(|_| FetchError::Other("first wave returned an unexpected number of results".to_string()))?;

        let business = match business {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                error!("Failed to fetch business {}: {}", id, e);
                return Err(e);
            }
        };

        let business = match business {
            Some(Value::Object(row)) => row,
            Some(other) => {
                return Err(FetchError::Serialization(format!(
                    "business row is not an object: {}",
                    other
                )))
            }
            None => {
                return Err(FetchError::NotFound {
                    entity: "business".to_string(),
                    id: id.to_string(),
                })
            }
        };

        let reviews = try_join(&tables.reviews, reviews);
        let stats = match stats {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                warn!("{}", partial_join(&tables.business_stats, &e));
                None
            }
        };

        let mut aggregate = BusinessAggregate::from_row(business);
        aggregate.stats = stats;
        aggregate.reviews = self.join_review_relations(ctx, reviews).await;

        if use_cache {
            self.cache
                .set(key, &aggregate, Some(self.config.business_ttl))
                .await?;
        }

        Ok(aggregate)
    }

    /// Fetch several businesses without their related data
    ///
    /// Duplicate ids are looked up once. Cached aggregates are returned first,
    /// followed by freshly fetched rows in the order the collaborator returned
    /// them; input order is not preserved. Fresh rows are cached under the same per-id key as
    /// [`fetch_business`](Self::fetch_business) uses, so a later single fetch
    /// of one of them is served the shallow aggregate until it expires.
    pub async fn fetch_businesses(&self, ids: &[String], use_cache: bool) -> Result<Vec<BusinessAggregate>> {
        self.fetch_businesses_with_context(&RequestContext::default(), ids, use_cache)
            .await
    }

    pub async fn fetch_businesses_with_context(
        &self,
        ctx: &RequestContext,
        ids: &[String],
        use_cache: bool,
    ) -> Result<Vec<BusinessAggregate>> {
        let mut found = Vec::new();
        let mut misses = Vec::new();
        let mut seen = HashSet::new();

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let cached = if use_cache {
                self.cached_aggregate(&business_cache_key(id)).await
            } else {
                None
            };
            match cached {
                Some(aggregate) => found.push(aggregate),
                None => misses.push(id.clone()),
            }
        }

        debug!("Business batch: {} cached, {} to fetch", found.len(), misses.len());

        if misses.is_empty() {
            return Ok(found);
        }

        let client = self.clients.acquire(ctx).await?;
        let rows = batch_fetch_by_ids(
            client.as_ref(),
            ctx,
            &self.config.tables.businesses,
            &misses,
            "*",
            self.config.id_chunk_size,
        )
        .await?;

        for row in rows {
            let Value::Object(row) = row else {
                warn!("Skipping non-object business row");
                continue;
            };

            let aggregate = BusinessAggregate::from_row(row);
            if use_cache {
                if let Some(id) = aggregate.id().map(value_key) {
                    self.cache
                        .set(business_cache_key(&id), &aggregate, Some(self.config.business_ttl))
                        .await?;
                }
            }
            found.push(aggregate);
        }

        Ok(found)
    }

    /// Drop one cached business, or every cached business when `id` is `None`
    pub async fn invalidate_business_cache(&self, id: Option<&str>) {
        match id {
            Some(id) => {
                info!("Invalidating cached business {}", id);
                self.cache.delete(&business_cache_key(id)).await;
            }
            None => {
                self.cache
                    .delete_by_prefix(&format!("{}:", BUSINESS_PREFIX))
                    .await;
            }
        }
    }

    async fn select_with_retry(
        &self,
        client: &dyn DataClient,
        query: &SelectQuery,
        ctx: &RequestContext,
    ) -> QueryResult<Vec<Value>> {
        self.config
            .retry
            .run_if(|| client.select(query, ctx), FetchError::is_retryable)
            .await
    }

    /// Cached aggregate, treating undecodable entries as misses
    async fn cached_aggregate(&self, key: &str) -> Option<BusinessAggregate> {
        match self.cache.get::<BusinessAggregate>(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Ignoring undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Second wave: attach images and author profiles to each review
    ///
    /// Any failure here, including failing to get clients, leaves the reviews
    /// without images or profiles instead of failing the fetch.
    async fn join_review_relations(
        &self,
        ctx: &RequestContext,
        reviews: Vec<Value>,
    ) -> Vec<ReviewWithRelations> {
        let mut reviews: Vec<ReviewWithRelations> = reviews
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(ReviewWithRelations::from_row(map)),
                _ => None,
            })
            .collect();

        if reviews.is_empty() {
            return reviews;
        }

        let review_ids: Vec<Value> = reviews.iter().filter_map(|r| r.id().cloned()).collect();

        let mut seen_users = HashSet::new();
        let user_ids: Vec<Value> = reviews
            .iter()
            .filter_map(|r| r.user_id())
            .filter(|user_id| !user_id.is_null() && seen_users.insert(value_key(user_id)))
            .cloned()
            .collect();

        let tables = &self.config.tables;
        let clients = match self.clients.acquire_many(2, ctx).await {
            Ok(clients) => clients,
            Err(e) => {
                let relations = format!("{}+{}", tables.review_images, tables.profiles);
                warn!("{}", partial_join(&relations, &e));
                return reviews;
            }
        };
        let joins = [
            (tables.review_images.as_str(), "review_id", review_ids),
            (tables.profiles.as_str(), "user_id", user_ids),
        ];
        let chunk_size = self.config.id_chunk_size;

        let results = execute_parallel_queries(clients.iter().zip(joins.iter()).map(
            |(client, (table, column, ids))| {
                move || batch_fetch_by_column(client.as_ref(), ctx, table, column, ids, "*", chunk_size)
            },
        ))
        .await;

        let mut results = results.into_iter();
        let images = try_join(&tables.review_images, results.next().unwrap_or_else(|| Ok(Vec::new())));
        let profiles = try_join(&tables.profiles, results.next().unwrap_or_else(|| Ok(Vec::new())));

        let mut images_by_review: HashMap<String, Vec<Value>> = HashMap::new();
        for image in images {
            if let Some(review_id) = image.get("review_id").map(value_key) {
                images_by_review.entry(review_id).or_default().push(image);
            }
        }

        let profiles_by_user: HashMap<String, Value> = profiles
            .into_iter()
            .filter_map(|profile| {
                let user_id = profile.get("user_id").map(value_key)?;
                Some((user_id, profile))
            })
            .collect();

        for review in &mut reviews {
            if let Some(id) = review.id().map(value_key) {
                review.images = images_by_review.remove(&id).unwrap_or_default();
            }
            if let Some(user_id) = review.user_id().map(value_key) {
                review.profile = profiles_by_user.get(&user_id).cloned();
            }
        }

        reviews
    }
}

/// Downgrade a failed secondary fetch to an empty list
fn try_join(relation: &str, result: QueryResult<Vec<Value>>) -> Vec<Value> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            warn!("{}", partial_join(relation, &e));
            Vec::new()
        }
    }
}

fn partial_join(relation: &str, cause: &FetchError) -> FetchError {
    FetchError::PartialJoin {
        relation: relation.to_string(),
        reason: cause.to_string(),
    }
}

/// Join key for an id column: strings verbatim, other values as JSON
fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
