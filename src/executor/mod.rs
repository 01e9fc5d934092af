//! Concurrency strategies over query tasks
//!
//! A query task is any zero-argument closure returning a future of
//! [`QueryResult`]. Strategies never turn one task's failure into a failure of
//! the whole call: every task settles into its own `Ok`/`Err` slot. Only
//! malformed arguments (a zero batch or chunk size) are reported as
//! [`FetchError::InvalidInput`].
//!
//! None of these functions touch the cache.

pub mod stream;

use futures::future::join_all;
use serde_json::Value;
use std::cmp::Reverse;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{DataClient, RequestContext, SelectQuery};
use crate::error::{FetchError, Result};

pub use stream::stream_query_results;

/// Outcome of one query task: `Ok(data)` or `Err(error)`, never both
pub type QueryResult<T> = Result<T>;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_ID_CHUNK_SIZE: usize = 100;
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 50;

/// Run every task concurrently and wait for all of them
///
/// Results come back in input order regardless of completion order.
pub async fn execute_parallel_queries<T, F, Fut, I>(tasks: I) -> Vec<QueryResult<T>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    join_all(tasks.into_iter().map(|task| task())).await
}

/// Run tasks in consecutive groups of at most `batch_size`
///
/// Tasks inside a group run concurrently; the next group starts only after
/// the previous one has fully settled. Results keep input order.
pub async fn execute_batched_queries<T, F, Fut, I>(tasks: I, batch_size: usize) -> Result<Vec<QueryResult<T>>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    if batch_size == 0 {
        return Err(FetchError::InvalidInput("batch_size must be greater than 0".to_string()));
    }

    let mut tasks = tasks.into_iter();
    let mut results = Vec::new();

    loop {
        let batch: Vec<F> = tasks.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        debug!("Running query batch of {}", batch.len());
        results.extend(execute_parallel_queries(batch).await);
    }

    Ok(results)
}

/// Race a task against a timer
///
/// The task runs on its own tokio task. When the timer wins, the caller gets
/// [`FetchError::Timeout`] and the task is left running detached: it is not
/// cancelled, so any side effects it has may still happen later, unobserved.
pub async fn execute_with_timeout<T, F, Fut>(task: F, timeout: Duration) -> QueryResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = QueryResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(task());

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(FetchError::Other(format!("query task aborted: {}", join_error))),
        Err(_) => {
            warn!("Query abandoned after {:?}", timeout);
            Err(FetchError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first retry, doubled before each further one
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before attempt `attempt` (zero-based; attempt 0 never waits)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.initial_delay.saturating_mul(factor)
    }

    /// Retry on every error
    pub async fn run<T, F, Fut>(&self, task: F) -> QueryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        self.run_if(task, |_| true).await
    }

    /// Retry only while `should_retry` accepts the error
    ///
    /// Returns the first success, or the error of the last attempt made.
    pub async fn run_if<T, F, Fut, P>(&self, mut task: F, should_retry: P) -> QueryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
        P: Fn(&FetchError) -> bool,
    {
        let mut attempt = 0;

        loop {
            match task().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Query succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_retries || !should_retry(&e) => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "Query failed (attempt {}/{}), retrying after {:?}: {}",
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Attempt a task up to `max_retries + 1` times with exponential backoff
pub async fn execute_with_retry<T, F, Fut>(task: F, max_retries: u32, initial_delay: Duration) -> QueryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    RetryPolicy::new(max_retries, initial_delay).run(task).await
}

/// Fetch rows whose `id` is in `ids`, in parallel chunks
///
/// See [`batch_fetch_by_column`].
pub async fn batch_fetch_by_ids<V>(
    client: &dyn DataClient,
    ctx: &RequestContext,
    table: &str,
    ids: &[V],
    select: &str,
    chunk_size: usize,
) -> QueryResult<Vec<Value>>
where
    V: Clone + Into<Value>,
{
    batch_fetch_by_column(client, ctx, table, "id", ids, select, chunk_size).await
}

/// Fetch rows whose `column` is in `ids`, one query per chunk of `chunk_size`
///
/// All chunk queries run concurrently and their rows are concatenated in
/// chunk order. All or nothing: if any chunk fails the first failing chunk's
/// error is returned and every row is discarded.
pub async fn batch_fetch_by_column<V>(
    client: &dyn DataClient,
    ctx: &RequestContext,
    table: &str,
    column: &str,
    ids: &[V],
    select: &str,
    chunk_size: usize,
) -> QueryResult<Vec<Value>>
where
    V: Clone + Into<Value>,
{
    if chunk_size == 0 {
        return Err(FetchError::InvalidInput("chunk_size must be greater than 0".to_string()));
    }

    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let queries: Vec<SelectQuery> = ids
        .chunks(chunk_size)
        .map(|chunk| {
            SelectQuery::from(table)
                .columns(select)
                .in_list(column, chunk.iter().cloned())
        })
        .collect();

    debug!("Fetching {} {} rows in {} chunks", ids.len(), table, queries.len());

    let results = execute_parallel_queries(queries.iter().map(|query| move || client.select(query, ctx))).await;

    let mut rows = Vec::new();
    for result in results {
        rows.extend(result?);
    }
    Ok(rows)
}

/// Run tasks one at a time, highest priority first
///
/// Equal priorities keep their input order. Results are returned in execution
/// order, not input order.
pub async fn execute_with_priority<T, F, Fut>(mut tasks: Vec<(i32, F)>) -> Vec<QueryResult<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    tasks.sort_by_key(|(priority, _)| Reverse(*priority));

    let mut results = Vec::with_capacity(tasks.len());
    for (priority, task) in tasks {
        debug!("Running query with priority {}", priority);
        results.push(task().await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_if_stops_on_permanent_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: QueryResult<()> = RetryPolicy::default()
            .run_if(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err(FetchError::Upstream {
                            status: 400,
                            message: "bad filter".to_string(),
                        })
                    }
                },
                FetchError::is_retryable,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batched_rejects_zero_batch_size() {
        let tasks: Vec<fn() -> std::future::Ready<QueryResult<i32>>> = vec![];
        let result = execute_batched_queries(tasks, 0).await;
        assert!(matches!(result, Err(FetchError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_priority_is_stable_for_ties() {
        let tasks: Vec<(i32, Box<dyn FnOnce() -> std::future::Ready<QueryResult<&'static str>>>)> = vec![
            (1, Box::new(|| std::future::ready(Ok("low")))),
            (5, Box::new(|| std::future::ready(Ok("first-high")))),
            (5, Box::new(|| std::future::ready(Ok("second-high")))),
        ];

        let results: Vec<&str> = execute_with_priority(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec!["first-high", "second-high", "low"]);
    }
}
