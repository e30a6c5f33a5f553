//! The core agent loop — the heart of Inklore.
//!
//! The agent follows a **reason → call tools → observe → respond** cycle:
//!
//! 1. **Receive** a user question
//! 2. **Stream** a model turn through the chunk decoder, accumulating
//!    reasoning text, visible text, and tool-call fragments
//! 3. **If tool calls**: execute them sequentially, append results, loop
//! 4. **If text only**: that is the final answer — normalize citations,
//!    persist the exchange, and return
//!
//! The loop continues until the model responds with text only, the
//! iteration or wall-clock budget runs out, or the run is cancelled. On
//! unrecoverable errors the whole request is re-run through the simpler
//! non-agentic answer path.

pub mod controller;
pub mod fallback;
pub mod grounding;
pub mod reasoning;
pub mod retry;
pub mod test_helpers;

pub use controller::{AgentLoop, AgentOutcome, RunOutcome};
pub use fallback::SimpleAnswerPath;
pub use grounding::{GroundingState, format_grounding};
pub use reasoning::{
    INTERRUPTED_NOTICE, ReasoningMarker, ReasoningStatus, ReasoningStep, ReasoningTracker,
};
pub use retry::{RetryPolicy, with_overload_backoff};
