//! # Inklore Core
//!
//! Domain types, traits, and error definitions for the Inklore agent
//! execution engine. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod cancel;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use cancel::{CancelReason, CancelSignal, TerminalNotice};
pub use error::{AgentError, Error, MemoryError, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use memory::{StoredExchange, TranscriptStore};
pub use message::{ChatMessage, Role, ToolCallIntent, Transcript, TranscriptId};
pub use provider::{
    ChatRequest, ChatResponse, ChunkShape, ContentDelta, ContentPart, Provider, StreamChunk,
    TokenUsage, ToolCallDelta, ToolDefinition,
};
pub use retrieval::{RetrievedNote, Retriever, SourceRef};
pub use tool::{NativeToolCall, Tool, ToolOutcome, ToolRegistry};
