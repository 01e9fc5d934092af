//! In-memory collaborator used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sayso_fetch::client::{DataClient, Filter, RequestContext, SelectQuery};
use sayso_fetch::{FetchError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

type FailRule = Box<dyn Fn(&SelectQuery) -> Option<FetchError> + Send + Sync>;

/// Serves rows from per-table fixtures and records every query it sees
#[derive(Default)]
pub struct MockClient {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<SelectQuery>>,
    fail_rules: Mutex<Vec<FailRule>>,
    latency: Mutex<HashMap<String, Duration>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    pub fn with_latency(self, table: &str, latency: Duration) -> Self {
        self.latency.lock().unwrap().insert(table.to_string(), latency);
        self
    }

    /// Fail every query against `table`
    pub fn fail_table(&self, table: &str) {
        let table = table.to_string();
        self.fail_when(move |query| {
            (query.table == table).then(|| FetchError::Upstream {
                status: 503,
                message: format!("{} unavailable", table),
            })
        });
    }

    pub fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&SelectQuery) -> Option<FetchError> + Send + Sync + 'static,
    {
        self.fail_rules.lock().unwrap().push(Box::new(rule));
    }

    pub fn clear_failures(&self) {
        self.fail_rules.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<SelectQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, table: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.table == table)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

fn key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => row.get(column).map(key) == Some(key(value)),
        Filter::In { column, values } => row
            .get(column)
            .map(key)
            .is_some_and(|v| values.iter().any(|candidate| key(candidate) == v)),
    }
}

#[async_trait]
impl DataClient for MockClient {
    async fn select(&self, query: &SelectQuery, _ctx: &RequestContext) -> Result<Vec<Value>> {
        self.calls.lock().unwrap().push(query.clone());

        let latency = self.latency.lock().unwrap().get(&query.table).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .fail_rules
            .lock()
            .unwrap()
            .iter()
            .find_map(|rule| rule(query));
        if let Some(error) = failure {
            return Err(error);
        }

        let mut rows: Vec<Value> = self
            .tables
            .lock()
            .unwrap()
            .get(&query.table)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| query.filters.iter().all(|f| matches(row, f)))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by_key(|row| row.get(&order.column).map(key).unwrap_or_default());
            if order.descending {
                rows.reverse();
            }
        }

        let offset = query.offset().unwrap_or(0);
        let limit = query.limit().unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn call_procedure(&self, name: &str, params: &Value, _ctx: &RequestContext) -> Result<Value> {
        Ok(json!({ "procedure": name, "params": params }))
    }
}

/// Fixture: two businesses, three reviews on biz-1 from two users
pub fn seeded_client() -> MockClient {
    MockClient::new()
        .with_rows(
            "businesses",
            vec![
                json!({"id": "biz-1", "name": "Blue Door Cafe", "category": "cafe"}),
                json!({"id": "biz-2", "name": "Corner Deli", "category": "deli"}),
                json!({"id": "biz-3", "name": "Night Owl Books", "category": "books"}),
            ],
        )
        .with_rows(
            "reviews",
            vec![
                json!({"id": "r1", "business_id": "biz-1", "user_id": "u1", "rating": 5, "created_at": "2024-01-01T10:00:00Z"}),
                json!({"id": "r2", "business_id": "biz-1", "user_id": "u2", "rating": 3, "created_at": "2024-02-01T10:00:00Z"}),
                json!({"id": "r3", "business_id": "biz-1", "user_id": "u1", "rating": 4, "created_at": "2024-03-01T10:00:00Z"}),
            ],
        )
        .with_rows(
            "business_stats",
            vec![json!({"business_id": "biz-1", "average_rating": 4.0, "total_reviews": 3})],
        )
        .with_rows(
            "review_images",
            vec![
                json!({"id": "img-1", "review_id": "r1", "url": "https://cdn.example/1.jpg"}),
                json!({"id": "img-2", "review_id": "r1", "url": "https://cdn.example/2.jpg"}),
                json!({"id": "img-3", "review_id": "r3", "url": "https://cdn.example/3.jpg"}),
            ],
        )
        .with_rows(
            "profiles",
            vec![
                json!({"user_id": "u1", "display_name": "Ada"}),
                json!({"user_id": "u2", "display_name": "Grace"}),
            ],
        )
}
