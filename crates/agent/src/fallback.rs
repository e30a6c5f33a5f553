//! The simpler non-agentic answer path.
//!
//! When the agentic loop fails with a non-cancellation error, the request
//! is re-run here: one retrieval, one completion, no tool loop. The
//! transcript is rebuilt from scratch under this fresh instance rather
//! than patched up from the failed run.

use std::sync::Arc;

use inklore_core::cancel::{CancelReason, CancelSignal};
use inklore_core::error::AgentError;
use inklore_core::message::{ChatMessage, Transcript};
use inklore_core::provider::{ChatRequest, Provider};
use inklore_core::retrieval::{RetrievedNote, Retriever, SourceRef};
use tracing::{info, warn};

use crate::controller::{AgentOutcome, RunOutcome};
use crate::grounding::format_grounding;

/// Single retrieval + single completion.
pub struct SimpleAnswerPath {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    retriever: Option<Arc<dyn Retriever>>,
}

impl SimpleAnswerPath {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            retriever: None,
        }
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Attach the retrieval capability used for the single grounding pass.
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Answer the question without the tool loop.
    pub async fn answer(
        &self,
        question: &str,
        cancel: &CancelSignal,
    ) -> Result<AgentOutcome, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled(
                cancel.reason().unwrap_or(CancelReason::Interrupted),
            ));
        }

        info!(model = %self.model, "Simple answer path engaged");

        let notes: Vec<RetrievedNote> = match &self.retriever {
            Some(retriever) => match retriever.search(question, &[]).await {
                Ok(notes) => notes,
                Err(e) => {
                    // Retrieval failure degrades to an ungrounded answer.
                    warn!(error = %e, "Fallback retrieval failed, answering without context");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut sources: Vec<SourceRef> = Vec::new();
        for note in &notes {
            if !sources.iter().any(|s| s.path == note.path) {
                sources.push(note.source_ref());
            }
        }

        let mut transcript = Transcript::new();
        let user_content = if notes.is_empty() {
            question.to_string()
        } else {
            let context = notes
                .iter()
                .map(|n| format!("### {}\n{}", n.title, n.content))
                .collect::<Vec<_>>()
                .join("\n\n");
            format_grounding(&context, question)
        };
        transcript.push(ChatMessage::user(user_content));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: transcript.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: Vec::new(),
            stream: false,
        };

        let response = self.provider.complete(request).await?;

        Ok(AgentOutcome {
            text: response.message.content,
            was_truncated: false,
            usage: response.usage,
            sources,
            iterations: 1,
            outcome: RunOutcome::Completed,
        })
    }
}
