//! Provider trait — the abstraction over streaming LLM backends.
//!
//! A Provider knows how to send a transcript to an LLM and get a response
//! back, either as a complete message or as an incremental chunk stream.
//! The chunk type deliberately models the union of the wire shapes seen in
//! the field: content as a plain string, content as a list of typed parts,
//! and reasoning delivered through vendor-specific side channels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ChatMessage, ToolCallIntent};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "deepseek-chat")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<ChatMessage>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A typed part of a content delta, for providers that deliver content as a
/// list of blocks rather than a single string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Thinking { thinking: String },
}

/// Content carried by one chunk: either a plain string delta or a list of
/// typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentDelta {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A partially-delivered tool call fragment. Fragments for the same `index`
/// are concatenated in arrival order by the accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Which call slot this fragment belongs to.
    pub index: u32,

    /// Call id fragment, usually only present on the first fragment.
    #[serde(default)]
    pub id: Option<String>,

    /// Tool name fragment.
    #[serde(default)]
    pub name: Option<String>,

    /// Argument-JSON fragment.
    #[serde(default)]
    pub arguments: Option<String>,
}

/// The wire shape of a chunk, resolved once per chunk and dispatched via
/// explicit matching rather than ad hoc field probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkShape {
    /// Content delivered as a list of typed parts (text / thinking blocks).
    ClaudeStyle,
    /// Reasoning delivered through the `reasoning_content` side channel.
    DeepSeekStyle,
    /// Reasoning delivered through the `reasoning` side channel.
    OpenRouterStyle,
    /// Content as a single plain string, no reasoning channel.
    Plain,
}

/// A single chunk in a streaming response. Ephemeral: consumed and
/// discarded per chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Visible-content delta (plain string or typed parts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentDelta>,

    /// DeepSeek-style reasoning side channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    /// OpenRouter-style reasoning side channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Partial tool call fragments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Finish-reason signal, when present ("stop", "length", "tool_calls", …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Usage info (typically only on the final chunk).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// Resolve which wire shape this chunk uses. The side channels take
    /// precedence over plain content so a chunk carrying both reasoning and
    /// text is still classified by its reasoning channel.
    pub fn shape(&self) -> ChunkShape {
        if matches!(self.content, Some(ContentDelta::Parts(_))) {
            ChunkShape::ClaudeStyle
        } else if self.reasoning_content.is_some() {
            ChunkShape::DeepSeekStyle
        } else if self.reasoning.is_some() {
            ChunkShape::OpenRouterStyle
        } else {
            ChunkShape::Plain
        }
    }

    /// Convenience constructor for a plain text delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(ContentDelta::Text(text.into())),
            ..Self::default()
        }
    }
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated message
    pub message: ChatMessage,

    /// Token usage statistics
    pub usage: Option<TokenUsage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls
/// `complete()` or `stream()` without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<ChatResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single chunk.
    async fn stream(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let tool_calls = response
            .message
            .tool_calls
            .iter()
            .enumerate()
            .map(|(i, tc): (usize, &ToolCallIntent)| ToolCallDelta {
                index: i as u32,
                id: Some(tc.id.clone()),
                name: Some(tc.name.clone()),
                arguments: Some(tc.arguments.clone()),
            })
            .collect();
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(ContentDelta::Text(response.message.content)),
                tool_calls,
                finish_reason: Some("stop".into()),
                usage: response.usage,
                ..StreamChunk::default()
            }))
            .await;
        Ok(rx)
    }
}
