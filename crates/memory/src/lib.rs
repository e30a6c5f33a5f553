//! Transcript persistence backends for Inklore.
//!
//! The agent loop hands each finalized input/output pair to a
//! [`TranscriptStore`](inklore_core::memory::TranscriptStore); these are
//! the bundled implementations.

pub mod in_memory;
pub mod noop;

pub use in_memory::InMemoryStore;
pub use noop::NoopStore;
