//! Round-robin pool of collaborator handles

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::{ClientFactory, DataClient, PostgrestClient, RequestContext};
use crate::config::ClientConfig;
use crate::error::{FetchError, Result};

/// Fixed set of client handles handed out in rotation
///
/// Handles are shared, not leased: two concurrent requests may hold the same
/// handle. Each `DataClient` is expected to be safe for concurrent use.
pub struct ClientPool {
    clients: Vec<Arc<dyn DataClient>>,
    next: AtomicUsize,
}

impl ClientPool {
    /// Build `size` handles with `make`
    pub fn new<F>(size: usize, mut make: F) -> Result<Self>
    where
        F: FnMut() -> Result<Arc<dyn DataClient>>,
    {
        if size == 0 {
            return Err(FetchError::Config("pool size must be greater than 0".to_string()));
        }

        let clients = (0..size).map(|_| make()).collect::<Result<Vec<_>>>()?;
        info!("Created client pool with {} handles", size);

        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    /// Pool of PostgREST clients sized by `max_connections`
    pub fn postgrest(config: &ClientConfig) -> Result<Self> {
        Self::new(config.max_connections, || {
            Ok(Arc::new(PostgrestClient::new(config)?) as Arc<dyn DataClient>)
        })
    }

    pub fn size(&self) -> usize {
        self.clients.len()
    }

    fn next_client(&self) -> Arc<dyn DataClient> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        debug!("Handing out pooled client {}", slot);
        self.clients[slot].clone()
    }
}

#[async_trait]
impl ClientFactory for ClientPool {
    async fn acquire(&self, _ctx: &RequestContext) -> Result<Arc<dyn DataClient>> {
        Ok(self.next_client())
    }

    async fn acquire_many(&self, count: usize, _ctx: &RequestContext) -> Result<Vec<Arc<dyn DataClient>>> {
        Ok((0..count).map(|_| self.next_client()).collect())
    }
}
