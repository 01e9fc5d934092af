//! PostgREST client over reqwest
//!
//! Translates [`SelectQuery`] into PostgREST's URL grammar:
//!
//! - `select=<columns>`
//! - `<column>=eq.<value>`
//! - `<column>=in.("a","b")`
//! - `order=<column>.desc`
//! - `offset=<n>&limit=<n>`
//!
//! Stored procedures are `POST /rpc/<name>` with the parameters as JSON body.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{DataClient, Filter, RequestContext, SelectQuery};
use crate::config::ClientConfig;
use crate::error::{FetchError, Result};

#[derive(Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
}

impl PostgrestClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Config(e.to_string()))?;

        Ok(Self {
            http,
            rest_url: config.rest_url(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    /// Query-string pairs for a select
    pub fn query_params(query: &SelectQuery) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), query.columns.clone())];

        for filter in &query.filters {
            let encoded = match filter {
                Filter::Eq { value, .. } => format!("eq.{}", raw_value(value)),
                Filter::In { values, .. } => {
                    let list: Vec<String> = values.iter().map(quoted_value).collect();
                    format!("in.({})", list.join(","))
                }
            };
            params.push((filter.column().to_string(), encoded));
        }

        if let Some(order) = &query.order {
            let direction = if order.descending { "desc" } else { "asc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }

        if let Some(offset) = query.offset() {
            params.push(("offset".to_string(), offset.to_string()));
        }

        if let Some(limit) = query.limit() {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }

    fn auth_headers(&self, ctx: &RequestContext) -> Result<HeaderMap> {
        let bearer = ctx.access_token.as_deref().unwrap_or(&self.api_key);

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key).map_err(|e| FetchError::Config(e.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(|e| FetchError::Config(e.to_string()))?,
        );
        Ok(headers)
    }

    /// Send, giving up early if the context is cancelled
    async fn dispatch(&self, request: RequestBuilder, ctx: &RequestContext) -> Result<Response> {
        let send = request.headers(self.auth_headers(ctx)?).send();

        let response = match &ctx.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(FetchError::Cancelled),
                response = send => response?,
            },
            None => send.await?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);

        warn!("PostgREST returned {}: {}", status, message);
        Err(FetchError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DataClient for PostgrestClient {
    async fn select(&self, query: &SelectQuery, ctx: &RequestContext) -> Result<Vec<Value>> {
        let url = format!("{}/{}", self.rest_url, query.table);
        let params = Self::query_params(query);
        debug!("GET {} {:?}", url, params);

        let response = self.dispatch(self.http.get(url).query(&params), ctx).await?;
        let mut rows: Vec<Value> = response.json().await?;

        if query.single {
            rows.truncate(1);
        }
        Ok(rows)
    }

    async fn call_procedure(&self, name: &str, params: &Value, ctx: &RequestContext) -> Result<Value> {
        let url = format!("{}/rpc/{}", self.rest_url, name);
        debug!("POST {}", url);

        let response = self.dispatch(self.http.post(url).json(params), ctx).await?;
        Ok(response.json().await?)
    }
}

/// `eq.` operand: strings verbatim, everything else as JSON
fn raw_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `in.(...)` member: strings double-quoted so commas survive
fn quoted_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}
