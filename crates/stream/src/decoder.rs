//! Streaming response decoder.
//!
//! Consumes provider chunks and reconstructs interleaved reasoning text,
//! visible text, truncation signals, and token-usage metadata into a single
//! accumulated buffer. Reasoning segments are delimited with `<think>` /
//! `</think>` markers so the display layer can render them apart from the
//! answer, regardless of how the upstream transport interleaves its deltas.

use inklore_core::provider::{ChunkShape, ContentDelta, ContentPart, StreamChunk, TokenUsage};
use tracing::{debug, warn};

/// Marker opening a reasoning segment in the accumulated buffer.
pub const REASONING_START: &str = "<think>";

/// Marker closing a reasoning segment.
pub const REASONING_END: &str = "</think>";

/// Finish-reason values that signal the response was cut short.
const TRUNCATION_SIGNALS: &[&str] = &["length", "max_tokens", "MAX_TOKENS", "model_length"];

/// The finalized output of one streamed turn.
#[derive(Debug, Clone)]
pub struct DecodedResponse {
    /// The accumulated content, reasoning segments delimited by markers.
    pub content: String,

    /// Whether any chunk carried a truncation signal.
    pub was_truncated: bool,

    /// Last usage snapshot seen on the stream.
    pub usage: Option<TokenUsage>,

    /// Non-fatal repairs performed during decoding.
    pub warnings: Vec<String>,
}

type UpdateFn = Box<dyn FnMut(&str) + Send>;

/// Stateful per-turn chunk decoder.
///
/// One decoder instance lives for exactly one streamed model turn: feed it
/// chunks with [`process_chunk`](Self::process_chunk), then call
/// [`close`](Self::close) to obtain the finalized buffer.
pub struct StreamDecoder {
    buf: String,
    in_reasoning: bool,
    was_truncated: bool,
    usage: Option<TokenUsage>,
    warnings: Vec<String>,
    halted: bool,
    /// Buffer length at the end of the last chunk that was not mid-way
    /// through delivering a tool call.
    last_complete_mark: usize,
    on_update: Option<UpdateFn>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            in_reasoning: false,
            was_truncated: false,
            usage: None,
            warnings: Vec::new(),
            halted: false,
            last_complete_mark: 0,
            on_update: None,
        }
    }

    /// Register a callback invoked with the full accumulated buffer every
    /// time it changes.
    pub fn with_on_update(mut self, on_update: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(on_update));
        self
    }

    /// The current accumulated buffer.
    pub fn current_text(&self) -> &str {
        &self.buf
    }

    /// Whether the early-truncation policy has tripped.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Feed one chunk. No-op once the decoder has halted.
    pub fn process_chunk(&mut self, chunk: &StreamChunk) {
        if self.halted {
            return;
        }

        let before = self.buf.len();

        match chunk.shape() {
            ChunkShape::ClaudeStyle => {
                if let Some(ContentDelta::Parts(parts)) = &chunk.content {
                    for part in parts {
                        match part {
                            ContentPart::Thinking { thinking } => self.append_reasoning(thinking),
                            ContentPart::Text { text } => self.append_text(text),
                        }
                    }
                }
            }
            ChunkShape::DeepSeekStyle => {
                if let Some(reasoning) = &chunk.reasoning_content {
                    self.append_reasoning(reasoning);
                }
                if let Some(ContentDelta::Text(text)) = &chunk.content {
                    self.append_text(text);
                }
            }
            ChunkShape::OpenRouterStyle => {
                if let Some(reasoning) = &chunk.reasoning {
                    self.append_reasoning(reasoning);
                }
                if let Some(ContentDelta::Text(text)) = &chunk.content {
                    self.append_text(text);
                }
            }
            ChunkShape::Plain => {
                if let Some(ContentDelta::Text(text)) = &chunk.content {
                    self.append_text(text);
                }
            }
        }

        if let Some(reason) = &chunk.finish_reason {
            if TRUNCATION_SIGNALS.contains(&reason.as_str()) {
                // Sticky: never cleared once set.
                self.was_truncated = true;
                debug!(finish_reason = %reason, "Truncation signal detected");
            }
        }

        if let Some(usage) = chunk.usage {
            // Last write wins; usage normally arrives once, on the final chunk.
            self.usage = Some(usage);
        }

        if chunk.tool_calls.is_empty() {
            self.last_complete_mark = self.buf.len();
        } else if self.was_truncated {
            // Truncated mid-call: the remaining fragments can never form a
            // parsable call, so stop consuming and drop the dangling tail.
            self.halt_at_tool_boundary();
            return;
        }

        if self.buf.len() != before {
            self.notify();
        }
    }

    /// Stop accepting chunks and trim the buffer back to the last
    /// structurally complete tool-call boundary.
    pub fn halt_at_tool_boundary(&mut self) {
        if self.halted {
            return;
        }
        self.halted = true;
        if self.buf.len() > self.last_complete_mark {
            warn!(
                dropped_bytes = self.buf.len() - self.last_complete_mark,
                "Early truncation: trimming buffer to last complete boundary"
            );
            self.buf.truncate(self.last_complete_mark);
            self.notify();
        }
    }

    /// Finalize the turn.
    ///
    /// An open reasoning block is force-closed. An end marker with no
    /// matching start marker (malformed upstream output) gets a start
    /// marker synthesized and prepended — a best-effort repair, not a hard
    /// failure.
    pub fn close(mut self) -> DecodedResponse {
        if self.in_reasoning {
            self.buf.push('\n');
            self.buf.push_str(REASONING_END);
            self.buf.push('\n');
            self.in_reasoning = false;
        }

        if self.buf.contains(REASONING_END) && !self.buf.contains(REASONING_START) {
            self.buf = format!("{REASONING_START}\n{}", self.buf);
            let msg = "reasoning end marker without start; start marker synthesized".to_string();
            warn!("{msg}");
            self.warnings.push(msg);
        }

        DecodedResponse {
            content: self.buf,
            was_truncated: self.was_truncated,
            usage: self.usage,
            warnings: self.warnings,
        }
    }

    fn append_reasoning(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if !self.in_reasoning {
            self.buf.push_str(REASONING_START);
            self.buf.push('\n');
            self.in_reasoning = true;
        }
        self.buf.push_str(delta);
    }

    fn append_text(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if self.in_reasoning {
            self.buf.push('\n');
            self.buf.push_str(REASONING_END);
            self.buf.push('\n');
            self.in_reasoning = false;
        }
        self.buf.push_str(delta);
    }

    fn notify(&mut self) {
        if let Some(cb) = &mut self.on_update {
            cb(&self.buf);
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inklore_core::provider::ToolCallDelta;
    use std::sync::{Arc, Mutex};

    fn reasoning_chunk(text: &str) -> StreamChunk {
        StreamChunk {
            reasoning_content: Some(text.into()),
            ..StreamChunk::default()
        }
    }

    fn finish_chunk(reason: &str) -> StreamChunk {
        StreamChunk {
            finish_reason: Some(reason.into()),
            ..StreamChunk::default()
        }
    }

    #[test]
    fn plain_text_accumulates() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&StreamChunk::text("Hello, "));
        decoder.process_chunk(&StreamChunk::text("world"));
        let out = decoder.close();
        assert_eq!(out.content, "Hello, world");
        assert!(!out.was_truncated);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn reasoning_then_text_produces_well_formed_segments() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&reasoning_chunk("let me think"));
        decoder.process_chunk(&reasoning_chunk(" about this"));
        decoder.process_chunk(&StreamChunk::text("The answer is 42."));
        let out = decoder.close();
        assert_eq!(
            out.content,
            "<think>\nlet me think about this\n</think>\nThe answer is 42."
        );
    }

    #[test]
    fn alternating_segments_never_overlap() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&reasoning_chunk("first thought"));
        decoder.process_chunk(&StreamChunk::text("partial answer"));
        decoder.process_chunk(&reasoning_chunk("second thought"));
        decoder.process_chunk(&StreamChunk::text(" rest"));
        let out = decoder.close();

        let starts = out.content.matches(REASONING_START).count();
        let ends = out.content.matches(REASONING_END).count();
        assert_eq!(starts, 2);
        assert_eq!(ends, 2);
        // Text between a close and the next open is visible content.
        assert!(out.content.contains("\n</think>\npartial answer"));
    }

    #[test]
    fn close_force_closes_open_reasoning_block() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&reasoning_chunk("never finished"));
        let out = decoder.close();
        assert!(out.content.ends_with("</think>\n"));
        assert_eq!(
            out.content.matches(REASONING_START).count(),
            out.content.matches(REASONING_END).count()
        );
    }

    #[test]
    fn claude_style_parts_interleave() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&StreamChunk {
            content: Some(ContentDelta::Parts(vec![
                ContentPart::Thinking {
                    thinking: "hmm".into(),
                },
                ContentPart::Text {
                    text: "answer".into(),
                },
            ])),
            ..StreamChunk::default()
        });
        let out = decoder.close();
        assert_eq!(out.content, "<think>\nhmm\n</think>\nanswer");
    }

    #[test]
    fn openrouter_side_channel_is_reasoning() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&StreamChunk {
            reasoning: Some("or-style thought".into()),
            ..StreamChunk::default()
        });
        decoder.process_chunk(&StreamChunk::text("done"));
        let out = decoder.close();
        assert!(out.content.starts_with("<think>\nor-style thought"));
        assert!(out.content.ends_with("done"));
    }

    #[test]
    fn truncation_flag_is_sticky() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&finish_chunk("length"));
        decoder.process_chunk(&finish_chunk("stop"));
        let out = decoder.close();
        assert!(out.was_truncated);
    }

    #[test]
    fn stop_finish_reason_is_not_truncation() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&finish_chunk("stop"));
        assert!(!decoder.close().was_truncated);
    }

    #[test]
    fn usage_last_write_wins() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&StreamChunk {
            usage: Some(TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
            ..StreamChunk::default()
        });
        decoder.process_chunk(&StreamChunk {
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            ..StreamChunk::default()
        });
        let out = decoder.close();
        assert_eq!(out.usage.unwrap().total_tokens, 30);
    }

    #[test]
    fn orphan_end_marker_is_repaired() {
        let mut decoder = StreamDecoder::new();
        // Upstream emitted its own closing marker as plain text, with no
        // opening marker anywhere.
        decoder.process_chunk(&StreamChunk::text("some thought\n</think>\nanswer"));
        let out = decoder.close();
        assert!(out.content.starts_with(REASONING_START));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn on_update_sees_growing_buffer() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut decoder =
            StreamDecoder::new().with_on_update(move |s| sink.lock().unwrap().push(s.to_string()));
        decoder.process_chunk(&StreamChunk::text("a"));
        decoder.process_chunk(&StreamChunk::text("b"));
        let snapshots = seen.lock().unwrap();
        assert_eq!(snapshots.as_slice(), ["a".to_string(), "ab".to_string()]);
    }

    #[test]
    fn early_truncation_halts_and_trims() {
        let mut decoder = StreamDecoder::new();
        decoder.process_chunk(&StreamChunk::text("complete sentence."));
        // Truncation arrives while a tool call is mid-delivery.
        decoder.process_chunk(&StreamChunk {
            content: Some(ContentDelta::Text(" dangling".into())),
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("local_search".into()),
                arguments: Some(r#"{"que"#.into()),
            }],
            finish_reason: Some("length".into()),
            ..StreamChunk::default()
        });
        assert!(decoder.is_halted());
        // Further chunks are ignored.
        decoder.process_chunk(&StreamChunk::text("ignored"));
        let out = decoder.close();
        assert_eq!(out.content, "complete sentence.");
        assert!(out.was_truncated);
    }
}
