//! Tool execution system
//!
//! Provides the plumbing between model tool calls and project tools:
//! - Tool schemas advertised to the model
//! - Concurrent batch executor with per-call error isolation
//! - Retry manager (randomized exponential backoff) for model calls
//! - Shell command execution with timeouts

pub mod executor;
pub mod process;
pub mod registry;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use executor::{ToolExecutor, ToolHandler};
pub use registry::ToolRegistry;
pub use retry::RetryManager;
pub use types::{ToolResult, ToolSchema, ToolStats};
