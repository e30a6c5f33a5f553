//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the agent act during a run: search the vault,
//! look up a note, and so on. Ordinary tool-level failures are encoded in
//! the outcome's `success` flag; `Err` is reserved for catastrophic
//! dispatch errors (an unknown tool name).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A finalized, invocable tool call. Immutable once built from the
/// accumulated stream fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeToolCall {
    /// Unique call ID (matches the model's tool_call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Parsed arguments
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// The result of one tool execution. Produced once per call per iteration;
/// immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Which tool produced this
    pub tool_name: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content, formatted for the model
    pub result: String,

    /// Optional shorter form for user-facing display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_result: Option<String>,
}

impl ToolOutcome {
    /// A successful outcome.
    pub fn ok(tool_name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result: result.into(),
            display_result: None,
        }
    }

    /// A tool-level failure (not a dispatch error).
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result: reason.into(),
            display_result: None,
        }
    }

    /// Attach a display-oriented rendering of the result.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_result = Some(display.into());
        self
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "local_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments. Ordinary failures are
    /// reported via `ToolOutcome::failed`, not `Err`.
    async fn execute(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, read-only during a run.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a finalized tool call.
    pub async fn execute(
        &self,
        call: &NativeToolCall,
    ) -> std::result::Result<ToolOutcome, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone()).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
