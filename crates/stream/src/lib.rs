//! Streaming decode layer for Inklore.
//!
//! Two per-turn state machines sit between the provider's chunk stream and
//! the agent loop:
//!
//! - [`StreamDecoder`] reconstructs interleaved reasoning/visible text,
//!   truncation signals, and token usage from provider chunks.
//! - [`ToolCallAccumulator`] merges fragmented tool-call deltas into
//!   complete, invocable calls.
//!
//! Both are pure with respect to transport: they know nothing about tools,
//! loop iteration, or HTTP.

pub mod accumulator;
pub mod decoder;

pub use accumulator::ToolCallAccumulator;
pub use decoder::{DecodedResponse, REASONING_END, REASONING_START, StreamDecoder};
