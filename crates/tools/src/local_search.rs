//! Local vault search tool.
//!
//! Wraps the host's retrieval capability as an ordinary tool the model can
//! call. The structured result is additionally post-processed by the agent
//! loop to extract a source list and to assemble the grounded follow-up
//! turn.

use async_trait::async_trait;
use inklore_core::error::ToolError;
use inklore_core::retrieval::Retriever;
use inklore_core::tool::{Tool, ToolOutcome};
use std::sync::Arc;
use tracing::debug;

/// The registered name of the local search tool. The agent loop's
/// salient-term pre-expansion keys off this name.
pub const LOCAL_SEARCH_TOOL: &str = "local_search";

/// Searches the user's vault for notes relevant to a query.
pub struct LocalSearchTool {
    retriever: Arc<dyn Retriever>,
}

impl LocalSearchTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for LocalSearchTool {
    fn name(&self) -> &str {
        LOCAL_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the user's vault for notes relevant to a query. \
         Returns matching note excerpts with titles, paths, and relevance scores."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "salient_terms": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Additional recall terms to widen the search"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<ToolOutcome, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        if query.is_empty() {
            return Ok(ToolOutcome::failed(
                LOCAL_SEARCH_TOOL,
                "missing required argument: query",
            ));
        }

        let salient_terms: Vec<String> = arguments
            .get("salient_terms")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        debug!(query = %query, terms = salient_terms.len(), "Local search");

        match self.retriever.search(&query, &salient_terms).await {
            Ok(notes) => {
                let hits: Vec<serde_json::Value> = notes
                    .iter()
                    .map(|n| {
                        serde_json::json!({
                            "title": n.title,
                            "path": n.path,
                            "content": n.content,
                            "score": n.score,
                        })
                    })
                    .collect();
                let result = serde_json::to_string(&hits).unwrap_or_else(|_| "[]".into());
                Ok(ToolOutcome::ok(LOCAL_SEARCH_TOOL, result)
                    .with_display(format!("Found {} notes", notes.len())))
            }
            Err(e) => Ok(ToolOutcome::failed(
                LOCAL_SEARCH_TOOL,
                format!("search failed: {e}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inklore_core::retrieval::RetrievedNote;

    struct FixedRetriever {
        notes: Vec<RetrievedNote>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(
            &self,
            _query: &str,
            _salient_terms: &[String],
        ) -> Result<Vec<RetrievedNote>, ToolError> {
            Ok(self.notes.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn search(
            &self,
            _query: &str,
            _salient_terms: &[String],
        ) -> Result<Vec<RetrievedNote>, ToolError> {
            Err(ToolError::DispatchFailed {
                tool_name: LOCAL_SEARCH_TOOL.into(),
                reason: "index unavailable".into(),
            })
        }
    }

    fn args(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn returns_structured_hits() {
        let tool = LocalSearchTool::new(Arc::new(FixedRetriever {
            notes: vec![RetrievedNote {
                title: "Rust Notes".into(),
                path: "dev/rust.md".into(),
                content: "ownership".into(),
                score: 0.9,
            }],
        }));

        let outcome = tool
            .execute(args(serde_json::json!({"query": "ownership"})))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.display_result.as_deref(), Some("Found 1 notes"));

        let hits: Vec<serde_json::Value> = serde_json::from_str(&outcome.result).unwrap();
        assert_eq!(hits[0]["title"], "Rust Notes");
        assert_eq!(hits[0]["path"], "dev/rust.md");
    }

    #[tokio::test]
    async fn missing_query_is_tool_level_failure() {
        let tool = LocalSearchTool::new(Arc::new(FixedRetriever { notes: vec![] }));
        let outcome = tool.execute(args(serde_json::json!({}))).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.result.contains("query"));
    }

    #[tokio::test]
    async fn retriever_failure_is_not_a_dispatch_error() {
        let tool = LocalSearchTool::new(Arc::new(FailingRetriever));
        let outcome = tool
            .execute(args(serde_json::json!({"query": "anything"})))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.result.contains("index unavailable"));
    }
}
