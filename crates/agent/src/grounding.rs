//! Retrieval grounding.
//!
//! Post-processing around the local-search tool: pulling a source list out
//! of its structured result, assembling the grounded follow-up turn with
//! the context block ahead of the restated question, and carrying salient
//! recall terms forward so later searches in the same run don't redo work.

use inklore_core::retrieval::SourceRef;
use inklore_core::tool::{NativeToolCall, ToolOutcome};
use inklore_tools::LOCAL_SEARCH_TOOL;
use serde_json::Value;
use tracing::debug;

/// Run-scoped grounding state.
#[derive(Debug, Default)]
pub struct GroundingState {
    salient_terms: Vec<String>,
    sources: Vec<SourceRef>,
}

impl GroundingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources collected from retrieval results so far, in first-seen order.
    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// Augment a local-search call with previously computed recall terms.
    /// Calls to other tools pass through untouched.
    pub fn pre_expand(&self, mut call: NativeToolCall) -> NativeToolCall {
        if call.name != LOCAL_SEARCH_TOOL || self.salient_terms.is_empty() {
            return call;
        }

        let mut terms: Vec<Value> = call
            .arguments
            .get("salient_terms")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for term in &self.salient_terms {
            if !terms.iter().any(|v| v.as_str() == Some(term)) {
                terms.push(Value::String(term.clone()));
            }
        }
        debug!(terms = terms.len(), "Pre-expanded local search arguments");
        call.arguments
            .insert("salient_terms".into(), Value::Array(terms));
        call
    }

    /// Absorb a completed tool outcome: collect sources and recall terms
    /// from successful retrievals.
    pub fn absorb(&mut self, call: &NativeToolCall, outcome: &ToolOutcome) {
        if call.name != LOCAL_SEARCH_TOOL || !outcome.success {
            return;
        }
        for hit in parse_hits(&outcome.result) {
            if !self.sources.iter().any(|s| s.path == hit.path) {
                if !self
                    .salient_terms
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&hit.title))
                {
                    self.salient_terms.push(hit.title.clone());
                }
                self.sources.push(hit);
            }
        }
    }

    /// Transform a raw tool outcome into the transcript-ready tool-result
    /// content for the next model turn.
    ///
    /// Retrieval results get the context-before-question ordering: the
    /// labelled context block always precedes the restated user question so
    /// the grounding stays maximally salient to the model.
    pub fn render_tool_result(
        &self,
        call: &NativeToolCall,
        outcome: &ToolOutcome,
        question: &str,
    ) -> String {
        if !outcome.success {
            return format!("Tool {} failed: {}", call.name, outcome.result);
        }
        if call.name != LOCAL_SEARCH_TOOL {
            return outcome.result.clone();
        }

        let hits = parse_hits_full(&outcome.result);
        if hits.is_empty() {
            return "No matching notes were found in the vault.".into();
        }

        let context = hits
            .iter()
            .map(|(source, content)| format!("### {}\n{content}", source.title))
            .collect::<Vec<_>>()
            .join("\n\n");
        format_grounding(&context, question)
    }
}

/// Context block first, with a label, then the restated user question.
pub fn format_grounding(context: &str, question: &str) -> String {
    format!(
        "Here is relevant context from the vault:\n\n{context}\n\n\
         Based on the context above, answer the user's question: {question}"
    )
}

fn parse_hits(raw: &str) -> Vec<SourceRef> {
    parse_hits_full(raw).into_iter().map(|(s, _)| s).collect()
}

fn parse_hits_full(raw: &str) -> Vec<(SourceRef, String)> {
    let Ok(Value::Array(items)) = serde_json::from_str(raw) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?.to_string();
            let path = item.get("path")?.as_str()?.to_string();
            let content = item
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            Some((SourceRef { title, path }, content))
        })
        .collect()
}
