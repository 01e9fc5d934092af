//! Remote data collaborator abstraction
//!
//! The fetch layer never talks HTTP directly. It asks a [`ClientFactory`] for
//! [`DataClient`] handles and issues [`SelectQuery`] reads or stored-procedure
//! calls through them. [`PostgrestClient`] is the production implementation;
//! tests substitute in-memory clients.

pub mod pool;
pub mod postgrest;
pub mod query;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use pool::ClientPool;
pub use postgrest::PostgrestClient;
pub use query::{Filter, Order, SelectQuery};

/// Per-request context handed to every collaborator call
///
/// Carries an optional access token (forwarded instead of the anon key when
/// present) and an optional cancellation token. Collaborators may stop work
/// once the token fires; nothing in the executor fires it on its own.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub access_token: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// A handle to the remote relational collaborator
#[async_trait]
pub trait DataClient: Send + Sync {
    /// Run a read and return the matching rows
    ///
    /// A `single()` query returns at most one row; zero rows is not an error.
    async fn select(&self, query: &SelectQuery, ctx: &RequestContext) -> Result<Vec<Value>>;

    /// Invoke a stored procedure
    async fn call_procedure(&self, name: &str, params: &Value, ctx: &RequestContext) -> Result<Value>;
}

/// Source of `DataClient` handles
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// One handle suitable for the given request
    async fn acquire(&self, ctx: &RequestContext) -> Result<Arc<dyn DataClient>>;

    /// `count` independent handles, for queries that run side by side
    async fn acquire_many(&self, count: usize, ctx: &RequestContext) -> Result<Vec<Arc<dyn DataClient>>> {
        let mut clients = Vec::with_capacity(count);
        for _ in 0..count {
            clients.push(self.acquire(ctx).await?);
        }
        Ok(clients)
    }
}

/// A single shared client is its own factory
#[async_trait]
impl<C> ClientFactory for Arc<C>
where
    C: DataClient + 'static,
{
    async fn acquire(&self, _ctx: &RequestContext) -> Result<Arc<dyn DataClient>> {
        Ok(self.clone() as Arc<dyn DataClient>)
    }
}
