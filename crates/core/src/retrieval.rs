//! Retrieval capability — the abstraction over the host's vault search.
//!
//! The retrieval subsystem itself (embedding, ranking, storage) lives in
//! the host application; the engine consumes it through this trait, invoked
//! as an ordinary tool during the agent loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// A reference to a source document eligible for citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Display title of the note
    pub title: String,

    /// Vault-relative path
    pub path: String,
}

/// One retrieved note with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedNote {
    /// Display title of the note
    pub title: String,

    /// Vault-relative path
    pub path: String,

    /// The matched content excerpt
    pub content: String,

    /// Relevance score (higher is better)
    pub score: f32,
}

impl RetrievedNote {
    /// The citation reference for this note.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            title: self.title.clone(),
            path: self.path.clone(),
        }
    }
}

/// The retrieval capability the local-search tool wraps.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Search the vault. `salient_terms` carries recall terms computed
    /// earlier in the run so downstream retrieval can avoid duplicate work.
    async fn search(
        &self,
        query: &str,
        salient_terms: &[String],
    ) -> std::result::Result<Vec<RetrievedNote>, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ref_from_note() {
        let note = RetrievedNote {
            title: "Rust Notes".into(),
            path: "dev/rust.md".into(),
            content: "ownership and borrowing".into(),
            score: 0.92,
        };
        let source = note.source_ref();
        assert_eq!(source.title, "Rust Notes");
        assert_eq!(source.path, "dev/rust.md");
    }
}
