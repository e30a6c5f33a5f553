//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use inklore_core::error::MemoryError;
use inklore_core::memory::{StoredExchange, TranscriptStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// An in-memory store keeping exchanges in a Vec.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryStore {
    exchanges: Arc<RwLock<Vec<StoredExchange>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            exchanges: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of persisted exchanges.
    pub async fn count(&self) -> usize {
        self.exchanges.read().await.len()
    }

    /// Snapshot of all persisted exchanges, in persistence order.
    pub async fn all(&self) -> Vec<StoredExchange> {
        self.exchanges.read().await.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryStore {
    async fn persist(&self, exchange: StoredExchange) -> Result<(), MemoryError> {
        debug!(
            input_len = exchange.input.len(),
            output_len = exchange.output.len(),
            "Persisting exchange"
        );
        self.exchanges.write().await.push(exchange);
        Ok(())
    }
}
