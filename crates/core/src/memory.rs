//! Transcript persistence capability.
//!
//! The engine hands the finalized input/output pair of a run to this trait
//! for long-term storage. It never receives multimodal structures — only
//! the fully reconciled text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// One finalized question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredExchange {
    /// The user's input as sent to the model
    pub input: String,

    /// The fully reconciled output text
    pub output: String,

    /// When the exchange completed
    pub timestamp: DateTime<Utc>,
}

impl StoredExchange {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Long-term storage for finalized exchanges. The engine does not define
/// the storage format, only that it receives reconciled text.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persist one finalized exchange.
    async fn persist(&self, exchange: StoredExchange) -> std::result::Result<(), MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_roundtrip() {
        let exchange = StoredExchange::new("question", "answer");
        let json = serde_json::to_string(&exchange).unwrap();
        let back: StoredExchange = serde_json::from_str(&json).unwrap();
        assert_eq!(back.input, "question");
        assert_eq!(back.output, "answer");
    }
}
