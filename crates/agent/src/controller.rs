//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use inklore_citations::{add_fallback_sources, process_inline_citations};
use inklore_config::EngineConfig;
use inklore_core::cancel::{CancelSignal, TerminalNotice};
use inklore_core::error::AgentError;
use inklore_core::event::{DomainEvent, EventBus};
use inklore_core::memory::{StoredExchange, TranscriptStore};
use inklore_core::message::{ChatMessage, ToolCallIntent, Transcript, TranscriptId};
use inklore_core::provider::{ChatRequest, Provider, TokenUsage};
use inklore_core::retrieval::SourceRef;
use inklore_core::tool::{ToolOutcome, ToolRegistry};
use inklore_stream::{DecodedResponse, StreamDecoder, ToolCallAccumulator};
use tracing::{debug, info, warn};

use crate::fallback::SimpleAnswerPath;
use crate::grounding::GroundingState;
use crate::reasoning::{INTERRUPTED_NOTICE, ReasoningTracker, UpdateFn};
use crate::retry::{RetryPolicy, with_overload_backoff};

/// How an agent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model produced a terminal answer.
    Completed,
    /// The iteration budget ran out; a best-effort answer was assembled.
    MaxIterationsReached,
    /// The wall-clock budget ran out; a best-effort answer was assembled.
    TimedOut,
    /// The run was cancelled.
    Aborted,
}

/// The finalized product of one run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The answer text (may embed the reasoning marker).
    pub text: String,

    /// Whether any model turn was cut short by the provider.
    pub was_truncated: bool,

    /// Token usage summed across all turns.
    pub usage: Option<TokenUsage>,

    /// Sources collected from retrieval during the run.
    pub sources: Vec<SourceRef>,

    /// Model invocations made.
    pub iterations: u32,

    /// How the run ended.
    pub outcome: RunOutcome,
}

/// The core agent loop that orchestrates streamed LLM calls and tool
/// execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry, read-only during a run
    tools: Arc<ToolRegistry>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    /// Optional system prompt prepended to each run's transcript
    system_prompt: Option<String>,

    /// Maximum tool call iterations per run
    max_iterations: u32,

    /// Wall-clock budget, checked at iteration boundaries
    loop_timeout: Duration,

    /// Progressive-reveal increment for the final answer
    reveal_chunk_chars: usize,

    /// Whether inline citations are normalized
    enable_inline_citations: bool,

    /// Overload retry policy
    retry: RetryPolicy,

    /// Optional transcript persistence
    store: Option<Arc<dyn TranscriptStore>>,

    /// Optional simpler path engaged when the agentic path fails
    fallback: Option<SimpleAnswerPath>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            event_bus,
            system_prompt: None,
            max_iterations: 4,
            loop_timeout: Duration::from_secs(120),
            reveal_chunk_chars: 200,
            enable_inline_citations: true,
            retry: RetryPolicy::default(),
            store: None,
            fallback: None,
        }
    }

    /// Create an agent loop wired from configuration.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        config: &EngineConfig,
    ) -> Self {
        let mut agent = Self::new(
            provider,
            config.model.name.clone(),
            config.model.temperature,
            tools,
            event_bus,
        );
        agent.max_tokens = config.model.max_tokens;
        agent.max_iterations = config.agent.max_iterations;
        agent.loop_timeout = config.agent.loop_timeout();
        agent.reveal_chunk_chars = config.agent.reveal_chunk_chars;
        agent.enable_inline_citations = config.citations.enable_inline;
        agent.retry = RetryPolicy {
            max_retries: config.retry.max_overload_retries,
            backoff_base: Duration::from_secs(config.retry.backoff_base_secs),
        };
        agent
    }

    /// Set the maximum number of tool call iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the wall-clock budget for the whole loop.
    pub fn with_loop_timeout(mut self, timeout: Duration) -> Self {
        self.loop_timeout = timeout;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the system prompt prepended to each run.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the progressive-reveal increment, in characters.
    pub fn with_reveal_chunk_chars(mut self, chars: usize) -> Self {
        self.reveal_chunk_chars = chars.max(1);
        self
    }

    /// Enable or disable inline citation normalization.
    pub fn with_inline_citations(mut self, enabled: bool) -> Self {
        self.enable_inline_citations = enabled;
        self
    }

    /// Set the overload retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Attach transcript persistence.
    pub fn with_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the simpler answer path engaged on agentic failure.
    pub fn with_fallback(mut self, fallback: SimpleAnswerPath) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Process a question and produce a finalized answer.
    ///
    /// This is the main entry point. It:
    /// 1. Streams model turns through the decoder and accumulator
    /// 2. Executes requested tools sequentially and loops
    /// 3. Falls back to the simple answer path on unrecoverable error
    /// 4. Normalizes citations in the finalized text
    /// 5. Persists the reconciled exchange
    pub async fn run(
        &self,
        question: &str,
        cancel: CancelSignal,
        on_update: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<AgentOutcome, AgentError> {
        let on_update: Arc<UpdateFn> = Arc::new(on_update);
        let run_id = TranscriptId::new();

        let outcome = match self.run_agentic(&run_id, question, &cancel, &on_update).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancellation() => return Err(e),
            Err(agentic_err) => {
                warn!(error = %agentic_err, "Agentic path failed, trying simple answer path");
                let Some(fallback) = &self.fallback else {
                    self.publish_failure(&run_id, &agentic_err);
                    return Err(agentic_err);
                };
                match fallback.answer(question, &cancel).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_cancellation() => return Err(e),
                    Err(fallback_err) => {
                        let combined = AgentError::FallbackFailed {
                            agentic: agentic_err.user_message(),
                            fallback: fallback_err.user_message(),
                        };
                        self.publish_failure(&run_id, &combined);
                        return Err(combined);
                    }
                }
            }
        };

        let outcome = self.post_process(outcome);

        if cancel.should_persist() {
            if let Some(store) = &self.store {
                let exchange = StoredExchange::new(question, &outcome.text);
                if let Err(e) = store.persist(exchange).await {
                    warn!(error = %e, "Failed to persist exchange");
                }
            }
        }

        self.event_bus.publish(DomainEvent::RunCompleted {
            transcript_id: run_id.to_string(),
            iterations: outcome.iterations,
            outcome: format!("{:?}", outcome.outcome),
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }

    async fn run_agentic(
        &self,
        run_id: &TranscriptId,
        question: &str,
        cancel: &CancelSignal,
        on_update: &Arc<UpdateFn>,
    ) -> Result<AgentOutcome, AgentError> {
        let mut transcript = Transcript::new();
        transcript.id = run_id.clone();
        if let Some(prompt) = &self.system_prompt {
            transcript.push(ChatMessage::system(prompt));
        }
        transcript.push(ChatMessage::user(question));

        info!(transcript_id = %transcript.id, model = %self.model, "Starting agent run");

        let tracker = ReasoningTracker::new();
        tracker.begin();
        let notice = TerminalNotice::new();
        let timer = tracker.spawn_display_timer(on_update.clone(), cancel.clone(), notice.clone());

        let tool_definitions = self.tools.definitions();
        let mut grounding = GroundingState::new();
        let started = Instant::now();
        let mut iteration: u32 = 0;
        let mut usage: Option<TokenUsage> = None;
        let mut was_truncated = false;
        let mut final_text = String::new();

        let outcome = 'run: loop {
            if cancel.is_cancelled() {
                break 'run RunOutcome::Aborted;
            }
            if started.elapsed() >= self.loop_timeout {
                warn!(
                    transcript_id = %transcript.id,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Loop timeout reached"
                );
                break 'run RunOutcome::TimedOut;
            }
            if iteration >= self.max_iterations {
                warn!(
                    transcript_id = %transcript.id,
                    iterations = iteration,
                    "Max tool iterations reached"
                );
                break 'run RunOutcome::MaxIterationsReached;
            }
            iteration += 1;
            debug!(transcript_id = %transcript.id, iteration, "Agent loop iteration");

            let request = ChatRequest {
                model: self.model.clone(),
                messages: transcript.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
                stream: true,
            };

            let turn = self.stream_turn(request, cancel, &tracker, on_update).await?;
            was_truncated |= turn.decoded.was_truncated;
            if let Some(turn_usage) = turn.decoded.usage {
                usage = Some(merge_usage(usage, turn_usage));
                self.event_bus.publish(DomainEvent::ModelResponded {
                    transcript_id: transcript.id.to_string(),
                    model: self.model.clone(),
                    tokens_used: turn_usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }
            for warning in &turn.warnings {
                tracker.add_step(warning.clone(), None, true);
            }

            if cancel.is_cancelled() {
                break 'run RunOutcome::Aborted;
            }

            if turn.calls.is_empty() {
                // No tool calls — this is the terminal answer.
                let content = turn.decoded.content;
                transcript.push(ChatMessage::assistant(&content));
                tracker.complete();
                final_text = if tracker.step_summaries().is_empty() {
                    content
                } else {
                    format!("{}\n{content}", tracker.final_marker())
                };
                self.reveal_progressively(&final_text, on_update);
                break 'run RunOutcome::Completed;
            }

            // The model wants tools. Record the intents, then dispatch
            // strictly sequentially: later calls in the same turn may have
            // been planned assuming earlier results, and the user-facing
            // trace must reflect true temporal order.
            let mut assistant = ChatMessage::assistant(&turn.decoded.content);
            assistant.tool_calls = turn
                .calls
                .iter()
                .map(|c| ToolCallIntent {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: serde_json::to_string(&c.arguments).unwrap_or_default(),
                })
                .collect();
            transcript.push(assistant);

            for call in turn.calls {
                if cancel.is_cancelled() {
                    break 'run RunOutcome::Aborted;
                }
                let call = grounding.pre_expand(call);
                tracker.add_step(
                    format!("Calling {}", call.name),
                    Some(call.name.clone()),
                    false,
                );

                let dispatch_start = Instant::now();
                let tool_outcome = match self.tools.execute(&call).await {
                    Ok(outcome) => outcome,
                    // Catastrophic dispatch errors are reported back to the
                    // model as failures so it can recover; the loop continues.
                    Err(e) => ToolOutcome::failed(&call.name, e.to_string()),
                };
                let duration_ms = dispatch_start.elapsed().as_millis() as u64;

                self.event_bus.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: tool_outcome.success,
                    duration_ms,
                    timestamp: Utc::now(),
                });

                if tool_outcome.success {
                    let summary = tool_outcome
                        .display_result
                        .clone()
                        .unwrap_or_else(|| format!("Completed {}", call.name));
                    tracker.add_step(summary, Some(call.name.clone()), false);
                } else {
                    warn!(tool = %call.name, reason = %tool_outcome.result, "Tool execution failed");
                    tracker.add_step(
                        format!("{} failed: {}", call.name, tool_outcome.result),
                        Some(call.name.clone()),
                        false,
                    );
                }

                grounding.absorb(&call, &tool_outcome);
                let content = grounding.render_tool_result(&call, &tool_outcome, question);
                transcript.push(ChatMessage::tool_result(&call.id, content));
            }
        };

        match outcome {
            RunOutcome::Completed => {}
            RunOutcome::Aborted => {
                tracker.complete();
                let mut text = tracker.render();
                if notice.try_claim() {
                    text = format!("{text}\n\n{INTERRUPTED_NOTICE}");
                    on_update.as_ref()(&text);
                }
                final_text = text;
                info!(transcript_id = %transcript.id, "Run aborted");
            }
            RunOutcome::TimedOut | RunOutcome::MaxIterationsReached => {
                tracker.complete();
                final_text = self.best_effort_answer(&tracker, outcome);
                on_update.as_ref()(&final_text);
            }
        }

        // Let the display timer observe the terminal state and wind down.
        let _ = timer.await;

        Ok(AgentOutcome {
            text: final_text,
            was_truncated,
            usage,
            sources: grounding.sources().to_vec(),
            iterations: iteration,
            outcome,
        })
    }

    async fn stream_turn(
        &self,
        request: ChatRequest,
        cancel: &CancelSignal,
        tracker: &ReasoningTracker,
        on_update: &Arc<UpdateFn>,
    ) -> Result<StreamedTurn, AgentError> {
        let provider = self.provider.clone();
        let mut rx = with_overload_backoff(self.retry, move || {
            let provider = provider.clone();
            let request = request.clone();
            async move { provider.stream(request).await }
        })
        .await?;

        let tracker_cb = tracker.clone();
        let update_cb = on_update.clone();
        let mut decoder = StreamDecoder::new().with_on_update(move |text| {
            tracker_cb.set_streamed_text(text);
            update_cb.as_ref()(&tracker_cb.render());
        });
        let mut accumulator = ToolCallAccumulator::new();

        while let Some(item) = rx.recv().await {
            if cancel.is_cancelled() {
                // Drain cleanly: stop consuming, but still close the decoder.
                debug!("Cancellation observed mid-stream");
                break;
            }
            match item {
                Ok(chunk) => {
                    for delta in &chunk.tool_calls {
                        accumulator.ingest(delta);
                    }
                    decoder.process_chunk(&chunk);
                    if decoder.is_halted() {
                        accumulator.discard_incomplete();
                        break;
                    }
                }
                Err(e) => {
                    let _ = decoder.close();
                    return Err(e.into());
                }
            }
        }

        let decoded = decoder.close();
        let (calls, warnings) = accumulator.finalize();
        Ok(StreamedTurn {
            decoded,
            calls,
            warnings,
        })
    }

    fn best_effort_answer(&self, tracker: &ReasoningTracker, outcome: RunOutcome) -> String {
        let notice = match outcome {
            RunOutcome::TimedOut => {
                "I reached the time limit before finishing. Here is what I found so far:"
            }
            _ => {
                "I reached the maximum number of reasoning steps before finishing. \
                 Here is what I found so far:"
            }
        };
        let summaries = tracker.step_summaries();
        let mut text = format!("{}\n\n{notice}", tracker.final_marker());
        if summaries.is_empty() {
            text.push_str("\n- (no findings were recorded)");
        } else {
            for summary in summaries {
                text.push_str(&format!("\n- {summary}"));
            }
        }
        text
    }

    /// Reveal the (already fully known) final text in fixed-size increments
    /// to preserve a streaming feel.
    fn reveal_progressively(&self, text: &str, on_update: &Arc<UpdateFn>) {
        let step = self.reveal_chunk_chars.max(1);
        let mut shown = 0usize;
        let mut chars_since_emit = 0usize;
        for (offset, ch) in text.char_indices() {
            chars_since_emit += 1;
            if chars_since_emit == step {
                let end = offset + ch.len_utf8();
                on_update.as_ref()(&text[..end]);
                chars_since_emit = 0;
                shown = end;
            }
        }
        if shown < text.len() {
            on_update.as_ref()(text);
        }
    }

    fn post_process(&self, mut outcome: AgentOutcome) -> AgentOutcome {
        outcome.text = process_inline_citations(&outcome.text, self.enable_inline_citations);
        outcome.text =
            add_fallback_sources(&outcome.text, &outcome.sources, self.enable_inline_citations);
        outcome
    }

    fn publish_failure(&self, run_id: &TranscriptId, error: &AgentError) {
        self.event_bus.publish(DomainEvent::RunFailed {
            transcript_id: run_id.to_string(),
            error_message: error.user_message(),
            timestamp: Utc::now(),
        });
    }
}

struct StreamedTurn {
    decoded: DecodedResponse,
    calls: Vec<inklore_core::tool::NativeToolCall>,
    warnings: Vec<String>,
}

fn merge_usage(acc: Option<TokenUsage>, turn: TokenUsage) -> TokenUsage {
    match acc {
        None => turn,
        Some(prev) => TokenUsage {
            prompt_tokens: prev.prompt_tokens + turn.prompt_tokens,
            completion_tokens: prev.completion_tokens + turn.completion_tokens,
            total_tokens: prev.total_tokens + turn.total_tokens,
        },
    }
}
