//! Error types for assertagent
//!
//! One error enum shared by the debugger, project tools, conversation
//! engine and pipeline driver. Verification failures are not errors; they
//! travel as data back into the review loop.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the assertion generation pipeline
#[derive(Error, Debug)]
pub enum AgentError {
    /// State machine transition errors
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Chat completion API errors (rate limits, 5xx, malformed envelopes)
    #[error("Model API error: {0}")]
    ModelApiError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Debugger could not be started or stopped answering
    #[error("Debugger error: {0}")]
    DebuggerError(String),

    /// The test file could not be put back to its original content
    #[error("Failed to restore {path}: {reason}")]
    RestoreFailed { path: PathBuf, reason: String },

    /// Tool invocation errors (bad arguments, unavailable backend)
    #[error("Tool error: {0}")]
    ToolError(String),

    /// Source, report or payload parsing errors
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic errors with context
    #[error("Agent error: {0}")]
    Generic(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Convert anyhow errors to AgentError
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Generic(err.to_string())
    }
}
