//! No-op store — disables transcript persistence entirely.

use async_trait::async_trait;
use inklore_core::error::MemoryError;
use inklore_core::memory::{StoredExchange, TranscriptStore};

/// A no-op store that persists nothing.
pub struct NoopStore;

#[async_trait]
impl TranscriptStore for NoopStore {
    async fn persist(&self, _exchange: StoredExchange) -> Result<(), MemoryError> {
        Ok(())
    }
}
