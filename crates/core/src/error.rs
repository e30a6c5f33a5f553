//! Error types for the Inklore domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::cancel::CancelReason;

/// The top-level error type for all Inklore operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Agent-loop errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Provider overloaded, retry after {retry_after_secs}s")]
    Overloaded { retry_after_secs: u64 },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this error is in the "overloaded" class that warrants a
    /// short backoff-and-retry rather than immediate propagation.
    pub fn is_overloaded(&self) -> bool {
        match self {
            Self::Overloaded { .. } => true,
            Self::ApiError {
                status_code,
                message,
            } => *status_code == 529 || message.to_ascii_lowercase().contains("overloaded"),
            _ => false,
        }
    }

    /// Whether this error is authentication-class, detected via status code
    /// or message heuristics.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::AuthenticationFailed(_) => true,
            Self::ApiError {
                status_code,
                message,
            } => {
                *status_code == 401
                    || *status_code == 403
                    || message.to_ascii_lowercase().contains("invalid api key")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool dispatch failed: {tool_name} — {reason}")]
    DispatchFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors surfaced by the agent loop layer.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Not an error in the taxonomy sense — the run was cancelled and
    /// short-circuited cleanly.
    #[error("Run cancelled ({0:?})")]
    Cancelled(CancelReason),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The agentic path failed and so did the simpler fallback path.
    /// Both messages are surfaced — the first failure is often the more
    /// diagnostic one.
    #[error("Agent loop failed: {agentic}; fallback also failed: {fallback}")]
    FallbackFailed { agentic: String, fallback: String },
}

impl AgentError {
    /// Whether this error represents cooperative cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// A user-facing message for this failure. Authentication-class errors
    /// get a distinct, actionable message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(p) if p.is_auth() => {
                "Authentication with the model provider failed. Check that your API key is set and valid.".into()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn overloaded_detection_by_status() {
        let err = ProviderError::ApiError {
            status_code: 529,
            message: "".into(),
        };
        assert!(err.is_overloaded());
    }

    #[test]
    fn overloaded_detection_by_message() {
        let err = ProviderError::ApiError {
            status_code: 500,
            message: "Overloaded".into(),
        };
        assert!(err.is_overloaded());
        let err = ProviderError::Network("connection reset".into());
        assert!(!err.is_overloaded());
    }

    #[test]
    fn auth_detection() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_auth());
        assert!(
            ProviderError::ApiError {
                status_code: 401,
                message: "".into()
            }
            .is_auth()
        );
        assert!(
            ProviderError::ApiError {
                status_code: 400,
                message: "invalid API key provided".into()
            }
            .is_auth()
        );
        assert!(!ProviderError::Timeout("slow".into()).is_auth());
    }

    #[test]
    fn fallback_failure_surfaces_both_messages() {
        let err = AgentError::FallbackFailed {
            agentic: "stream interrupted".into(),
            fallback: "network error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("stream interrupted"));
        assert!(msg.contains("network error"));
    }

    #[test]
    fn auth_error_gets_actionable_user_message() {
        let err = AgentError::Provider(ProviderError::AuthenticationFailed("nope".into()));
        assert!(err.user_message().contains("API key"));
    }

    #[test]
    fn cancellation_is_not_an_error() {
        let err = AgentError::Cancelled(CancelReason::Interrupted);
        assert!(err.is_cancellation());
        assert!(!AgentError::Provider(ProviderError::Timeout("x".into())).is_cancellation());
    }
}
