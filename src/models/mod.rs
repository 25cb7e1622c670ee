//! Language model transport
//!
//! - `ChatModel`: the one capability agents depend on
//! - `OpenAiClient`: OpenAI-compatible HTTP client
//! - `ScriptedModel`: deterministic replay for offline runs and tests

pub mod client;
pub mod scripted;
pub mod types;

// Re-export key types for convenience
pub use client::{ChatModel, OpenAiClient};
pub use scripted::ScriptedModel;
pub use types::{ModelResponse, SamplingParams, Usage};
