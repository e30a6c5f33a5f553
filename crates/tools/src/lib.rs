//! Built-in tool implementations for Inklore.
//!
//! Tools give the agent the ability to act during a run. The bundled set
//! is deliberately small: vault search is the capability the loop's
//! grounding machinery is built around.

pub mod local_search;

use std::sync::Arc;

use inklore_core::retrieval::Retriever;
use inklore_core::tool::ToolRegistry;

pub use local_search::{LOCAL_SEARCH_TOOL, LocalSearchTool};

/// Create a default tool registry wired to the given retriever.
pub fn default_registry(retriever: Arc<dyn Retriever>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(LocalSearchTool::new(retriever)));
    registry
}
