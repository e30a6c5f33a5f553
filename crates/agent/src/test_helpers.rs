//! Shared test helpers for agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use inklore_core::error::ProviderError;
use inklore_core::message::ChatMessage;
use inklore_core::provider::{
    ChatRequest, ChatResponse, ContentDelta, Provider, StreamChunk, TokenUsage, ToolCallDelta,
};

/// One scripted item on a streamed turn.
pub type ScriptItem = std::result::Result<StreamChunk, ProviderError>;

/// A provider that replays scripted chunk streams, one script per call.
///
/// Panics if more calls are made than scripts provided.
pub struct ScriptedStreamProvider {
    turns: Mutex<VecDeque<Vec<ScriptItem>>>,
    chunk_delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedStreamProvider {
    pub fn new(turns: Vec<Vec<ScriptItem>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            chunk_delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a provider that streams a single text answer.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text_turn(text)])
    }

    /// Delay between chunks, for cancellation-timing tests.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_turn(&self) -> Vec<ScriptItem> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        self.turns.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("ScriptedStreamProvider: no script left for call #{count}")
        })
    }
}

#[async_trait]
impl Provider for ScriptedStreamProvider {
    fn name(&self) -> &str {
        "scripted_stream"
    }

    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        // Collapse the next script into a complete response.
        let mut content = String::new();
        let mut usage = None;
        for item in self.next_turn() {
            let chunk = item?;
            if let Some(ContentDelta::Text(text)) = chunk.content {
                content.push_str(&text);
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
        }
        Ok(ChatResponse {
            message: ChatMessage::assistant(content),
            usage,
            model: "scripted".into(),
        })
    }

    async fn stream(
        &self,
        _request: ChatRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let turn = self.next_turn();
        let delay = self.chunk_delay;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            for item in turn {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// A provider whose first `failures` stream calls fail with the given
/// error, after which it delegates to an inner scripted provider.
pub struct FlakyProvider {
    inner: ScriptedStreamProvider,
    error: ProviderError,
    remaining_failures: AtomicU32,
    calls: AtomicUsize,
}

impl FlakyProvider {
    pub fn new(failures: u32, error: ProviderError, inner: ScriptedStreamProvider) -> Self {
        Self {
            inner,
            error,
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(self.error.clone());
        }
        self.inner.complete(request).await
    }

    async fn stream(
        &self,
        request: ChatRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(self.error.clone());
        }
        self.inner.stream(request).await
    }
}

/// A provider that always fails.
pub struct FailingProvider {
    pub error: ProviderError,
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(self.error.clone())
    }

    async fn stream(
        &self,
        _request: ChatRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        Err(self.error.clone())
    }
}

/// A text delta chunk.
pub fn text_chunk(text: &str) -> ScriptItem {
    Ok(StreamChunk::text(text))
}

/// A reasoning side-channel chunk.
pub fn reasoning_chunk(text: &str) -> ScriptItem {
    Ok(StreamChunk {
        reasoning_content: Some(text.into()),
        ..StreamChunk::default()
    })
}

/// The terminal chunk of an ordinary turn.
pub fn stop_chunk() -> ScriptItem {
    Ok(StreamChunk {
        finish_reason: Some("stop".into()),
        usage: Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        ..StreamChunk::default()
    })
}

/// A complete text-only turn.
pub fn text_turn(text: &str) -> Vec<ScriptItem> {
    vec![text_chunk(text), stop_chunk()]
}

/// A turn requesting one tool call, delivered as fragmented deltas the way
/// real providers split them.
pub fn tool_call_turn(id: &str, name: &str, args_json: &str) -> Vec<ScriptItem> {
    let split = args_json.len() / 2;
    let (head, tail) = args_json.split_at(split);
    vec![
        Ok(StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some(id.into()),
                name: Some(name.into()),
                arguments: Some(head.into()),
            }],
            ..StreamChunk::default()
        }),
        Ok(StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: Some(tail.into()),
            }],
            ..StreamChunk::default()
        }),
        Ok(StreamChunk {
            finish_reason: Some("tool_calls".into()),
            ..StreamChunk::default()
        }),
    ]
}
