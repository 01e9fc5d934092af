//! Integration tests for the executor strategies
//!
//! Timing-sensitive tests run on a paused clock so sleeps advance instantly
//! and elapsed times are exact.

mod common;

use common::MockClient;
use futures::StreamExt;
use sayso_fetch::client::{DataClient, Filter, RequestContext, SelectQuery};
use sayso_fetch::executor::{
    batch_fetch_by_column, batch_fetch_by_ids, execute_batched_queries, execute_parallel_queries,
    execute_with_priority, execute_with_retry, execute_with_timeout, stream_query_results, QueryResult,
};
use sayso_fetch::FetchError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_parallel_preserves_input_order() {
    let completed = Arc::new(Mutex::new(Vec::new()));
    let delays = [30u64, 20, 10];

    let tasks = delays.iter().enumerate().map(|(index, delay)| {
        let completed = completed.clone();
        move || async move {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
            completed.lock().unwrap().push(index);
            Ok::<_, FetchError>(format!("r{}", index))
        }
    });

    let start = Instant::now();
    let results = execute_parallel_queries(tasks).await;

    let values: Vec<String> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, vec!["r0", "r1", "r2"]);
    assert_eq!(*completed.lock().unwrap(), vec![2, 1, 0]);
    // concurrent, not sequential
    assert_eq!(start.elapsed(), Duration::from_millis(30));
}

#[tokio::test]
async fn test_parallel_does_not_abort_on_failure() {
    let tasks = (0..3).map(|i| {
        move || async move {
            if i == 1 {
                Err(FetchError::upstream("reviews unavailable"))
            } else {
                Ok(i * 10)
            }
        }
    });

    let results = execute_parallel_queries(tasks).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &0);
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap(), &20);
}

#[tokio::test(start_paused = true)]
async fn test_batched_limits_concurrency_and_keeps_order() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..12).map(|i| {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        move || async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10 + (12 - i) as u64)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, FetchError>(i)
        }
    });

    let start = Instant::now();
    let results = execute_batched_queries(tasks, 5).await.unwrap();

    let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, (0..12).collect::<Vec<_>>());
    assert_eq!(peak.load(Ordering::SeqCst), 5);
    // three sequential batches: slowest of each is 22ms, 17ms, 12ms
    assert_eq!(start.elapsed(), Duration::from_millis(22 + 17 + 12));
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_returns_last_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let start = Instant::now();
    let result: QueryResult<()> = execute_with_retry(
        move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(FetchError::upstream(format!("attempt {}", attempt))) }
        },
        3,
        Duration::from_millis(100),
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(result.unwrap_err(), FetchError::upstream("attempt 4"));
    // 100 + 200 + 400, nothing after the last attempt
    assert_eq!(start.elapsed(), Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn test_retry_success_after_two_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let result = execute_with_retry(
        move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(FetchError::Connection("reset".to_string()))
                } else {
                    Ok(json!({"id": "biz-1"}))
                }
            }
        },
        3,
        Duration::from_millis(100),
    )
    .await;

    assert_eq!(result.unwrap(), json!({"id": "biz-1"}));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_races_a_hung_task() {
    let start = Instant::now();
    let result: QueryResult<Value> =
        execute_with_timeout(|| std::future::pending(), Duration::from_millis(50)).await;

    assert_eq!(result.unwrap_err(), FetchError::Timeout { timeout_ms: 50 });
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(60));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_task_keeps_running() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();

    let result = execute_with_timeout(
        move || async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, FetchError>(())
        },
        Duration::from_millis(20),
    )
    .await;
    assert!(matches!(result, Err(FetchError::Timeout { .. })));
    assert!(!finished.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(finished.load(Ordering::SeqCst), "abandoned task should still complete");
}

#[tokio::test]
async fn test_timeout_passes_through_fast_results() {
    let ok = execute_with_timeout(|| async { Ok::<_, FetchError>(7) }, Duration::from_secs(5)).await;
    assert_eq!(ok.unwrap(), 7);

    let err: QueryResult<i32> =
        execute_with_timeout(|| async { Err(FetchError::upstream("boom")) }, Duration::from_secs(5)).await;
    assert_eq!(err.unwrap_err(), FetchError::upstream("boom"));
}

#[tokio::test]
async fn test_priority_runs_sequentially_highest_first() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<(i32, _)> = [(1, "low"), (10, "high"), (5, "mid")]
        .into_iter()
        .map(|(priority, name)| {
            let log = log.clone();
            let task = move || async move {
                log.lock().unwrap().push(format!("start {}", name));
                tokio::task::yield_now().await;
                log.lock().unwrap().push(format!("end {}", name));
                Ok::<_, FetchError>(name)
            };
            (priority, task)
        })
        .collect();

    let results: Vec<&str> = execute_with_priority(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results, vec!["high", "mid", "low"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["start high", "end high", "start mid", "end mid", "start low", "end low"]
    );
}

#[tokio::test]
async fn test_batch_fetch_by_ids_chunks_in_parallel() {
    let rows: Vec<Value> = (0..250).map(|i| json!({"id": i, "name": format!("b{}", i)})).collect();
    let client = MockClient::new().with_rows("businesses", rows);
    let ids: Vec<i64> = (0..250).collect();

    let fetched = batch_fetch_by_ids(&client, &RequestContext::new(), "businesses", &ids, "id,name", 100)
        .await
        .unwrap();

    assert_eq!(fetched.len(), 250);
    assert_eq!(fetched[0]["id"], 0);
    assert_eq!(fetched[249]["id"], 249);

    let calls = client.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|q| q.columns == "id,name"));
}

#[tokio::test]
async fn test_batch_fetch_is_all_or_nothing() {
    let rows: Vec<Value> = (0..30).map(|i| json!({"id": i})).collect();
    let client = MockClient::new().with_rows("businesses", rows);
    client.fail_when(|query: &SelectQuery| {
        let second_chunk = query.filters.iter().any(|filter| match filter {
            Filter::In { values, .. } => values.contains(&json!(10)),
            _ => false,
        });
        second_chunk.then(|| FetchError::upstream("chunk failed"))
    });

    let ids: Vec<i64> = (0..30).collect();
    let result = batch_fetch_by_ids(&client, &RequestContext::new(), "businesses", &ids, "*", 10).await;

    assert_eq!(result.unwrap_err(), FetchError::upstream("chunk failed"));
    assert_eq!(client.call_count(), 3);
}

#[tokio::test]
async fn test_batch_fetch_edge_cases() {
    let client = MockClient::new();
    let ctx = RequestContext::new();

    let empty: Vec<String> = Vec::new();
    let rows = batch_fetch_by_column(&client, &ctx, "profiles", "user_id", &empty, "*", 100)
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(client.call_count(), 0);

    let result = batch_fetch_by_ids(&client, &ctx, "profiles", &["u1".to_string()], "*", 0).await;
    assert!(matches!(result, Err(FetchError::InvalidInput(_))));
}

#[tokio::test]
async fn test_stream_delivers_fetched_rows_in_chunks() {
    let client = Arc::new(
        MockClient::new().with_rows("reviews", (0..120).map(|i| json!({"id": i})).collect()),
    );
    let source = client.clone();

    let chunks: Vec<QueryResult<Vec<Value>>> = stream_query_results(
        move || async move { source.select(&SelectQuery::from("reviews"), &RequestContext::new()).await },
        50,
    )
    .collect()
    .await;

    let sizes: Vec<usize> = chunks.iter().map(|c| c.as_ref().unwrap().len()).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
    assert_eq!(client.call_count(), 1);
}
