//! Configuration loading, validation, and management for Inklore.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides (`INKLORE_*`). Validates all settings at load time.

use std::path::Path;
use std::time::Duration;

use inklore_core::error::Error;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Agent loop budgets
    #[serde(default)]
    pub agent: AgentConfig,

    /// Model selection and sampling
    #[serde(default)]
    pub model: ModelConfig,

    /// Citation post-processing
    #[serde(default)]
    pub citations: CitationConfig,

    /// Transient-error retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-call iterations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock budget for the whole loop, in seconds
    #[serde(default = "default_loop_timeout_secs")]
    pub loop_timeout_secs: u64,

    /// Progressive-reveal increment for the final answer, in characters
    #[serde(default = "default_reveal_chunk_chars")]
    pub reveal_chunk_chars: usize,
}

impl AgentConfig {
    pub fn loop_timeout(&self) -> Duration {
        Duration::from_secs(self.loop_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            loop_timeout_secs: default_loop_timeout_secs(),
            reveal_chunk_chars: default_reveal_chunk_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The model to use
    #[serde(default = "default_model")]
    pub name: String,

    /// Temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationConfig {
    /// Whether inline footnote citations are rewritten and rendered
    #[serde(default = "default_true")]
    pub enable_inline: bool,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            enable_inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries for overloaded-class provider errors
    #[serde(default = "default_max_overload_retries")]
    pub max_overload_retries: u32,

    /// Linear backoff base, in seconds (attempt n waits n * base)
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_overload_retries: default_max_overload_retries(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

fn default_max_iterations() -> u32 {
    4
}
fn default_loop_timeout_secs() -> u64 {
    120
}
fn default_reveal_chunk_chars() -> usize {
    200
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}
fn default_max_overload_retries() -> u32 {
    2
}
fn default_backoff_base_secs() -> u64 {
    1
}

impl EngineConfig {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.as_ref().display()),
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from a TOML string, apply environment overrides,
    /// and validate.
    pub fn from_toml(raw: &str) -> Result<Self, Error> {
        let mut config: EngineConfig = toml::from_str(raw).map_err(|e| Error::Config {
            message: format!("invalid configuration: {e}"),
        })?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INKLORE_MAX_ITERATIONS") {
            if let Ok(n) = v.parse() {
                self.agent.max_iterations = n;
            }
        }
        if let Ok(v) = std::env::var("INKLORE_LOOP_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.agent.loop_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("INKLORE_MODEL") {
            self.model.name = v;
        }
        if let Ok(v) = std::env::var("INKLORE_ENABLE_INLINE_CITATIONS") {
            if let Ok(b) = v.parse() {
                self.citations.enable_inline = b;
            }
        }
    }

    /// Validate all settings.
    pub fn validate(&self) -> Result<(), Error> {
        if self.agent.max_iterations == 0 {
            return Err(Error::Config {
                message: "agent.max_iterations must be at least 1".into(),
            });
        }
        if self.agent.loop_timeout_secs == 0 {
            return Err(Error::Config {
                message: "agent.loop_timeout_secs must be at least 1".into(),
            });
        }
        if self.agent.reveal_chunk_chars == 0 {
            return Err(Error::Config {
                message: "agent.reveal_chunk_chars must be at least 1".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(Error::Config {
                message: format!(
                    "model.temperature must be within 0.0..=2.0, got {}",
                    self.model.temperature
                ),
            });
        }
        if self.model.name.is_empty() {
            return Err(Error::Config {
                message: "model.name must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Initialize the global tracing subscriber with env-filter support
/// (`RUST_LOG`). Safe to call once per process.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
