//! Tool-call fragment accumulator.
//!
//! Streaming providers deliver tool calls as fragments keyed by a call
//! index: the id arrives once, the name may arrive in pieces, and the
//! argument JSON trickles in across many chunks. This module merges those
//! fragments into complete, invocable calls at end of turn.

use std::collections::BTreeMap;

use inklore_core::provider::ToolCallDelta;
use inklore_core::tool::NativeToolCall;
use tracing::warn;

/// One accumulation cell, keyed by call index. Exactly one cell exists per
/// index per streamed turn.
#[derive(Debug, Default, Clone)]
struct ToolCallCell {
    id: String,
    name: String,
    args: String,
}

impl ToolCallCell {
    /// Whether the argument buffer parses as JSON (an empty buffer counts
    /// as complete — a call with no arguments).
    fn is_complete(&self) -> bool {
        let trimmed = self.args.trim();
        trimmed.is_empty() || serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    }
}

/// Merges fragmented tool-call deltas into complete calls.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    cells: BTreeMap<u32, ToolCallCell>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any fragments have been ingested this turn.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Ingest one fragment. Fragments for the same index are concatenated
    /// in arrival order; the first non-empty id for an index is retained.
    pub fn ingest(&mut self, delta: &ToolCallDelta) {
        let cell = self.cells.entry(delta.index).or_default();

        if cell.id.is_empty() {
            if let Some(id) = &delta.id {
                if !id.is_empty() {
                    cell.id = id.clone();
                }
            }
        }
        if let Some(name) = &delta.name {
            cell.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            cell.args.push_str(args);
        }
    }

    /// Drop trailing cells whose argument buffer is not valid JSON.
    ///
    /// Used by the early-truncation policy: a truncated stream can leave
    /// the highest-index call half-delivered while earlier calls are whole.
    pub fn discard_incomplete(&mut self) {
        while let Some((&index, cell)) = self.cells.last_key_value() {
            if cell.is_complete() {
                break;
            }
            warn!(index, tool = %cell.name, "Discarding partially delivered tool call");
            self.cells.remove(&index);
        }
    }

    /// Finalize the turn: parse each cell into an invocable call, in index
    /// order. Malformed argument JSON yields an empty-argument call plus a
    /// recorded warning — never a hard failure.
    pub fn finalize(self) -> (Vec<NativeToolCall>, Vec<String>) {
        let mut calls = Vec::with_capacity(self.cells.len());
        let mut warnings = Vec::new();

        for (index, cell) in self.cells {
            let arguments = parse_arguments(&cell.args).unwrap_or_else(|e| {
                let msg = format!(
                    "tool call {} (index {index}): malformed arguments, using empty map: {e}",
                    cell.name
                );
                warn!("{msg}");
                warnings.push(msg);
                serde_json::Map::new()
            });

            calls.push(NativeToolCall {
                id: cell.id,
                name: cell.name,
                arguments,
            });
        }

        (calls, warnings)
    }
}

/// Parse an accumulated argument string. Empty, whitespace-only, and bare
/// `{}` buffers sanitize to an empty map rather than surfacing as a
/// spurious populated call.
fn parse_arguments(
    raw: &str,
) -> std::result::Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        return Ok(serde_json::Map::new());
    }
    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        // Non-object argument payloads are treated as absent.
        _ => Ok(serde_json::Map::new()),
    }
}
