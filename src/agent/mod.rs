//! Agents and the conversation engine they share
//!
//! - `engine`: the tool-aware turn loop and the `ConversationDriver` seam
//! - `conversation` / `state`: history with checkpoints, turn counters
//! - `explorer`, `writer`, `reviewer`: role drivers
//! - `role`: the closed set of roles the graph dispatches on

pub mod conversation;
pub mod cycle;
pub mod engine;
pub mod explorer;
pub mod prompts;
pub mod reviewer;
pub mod role;
pub mod state;
pub mod writer;

// Re-export commonly used types
pub use conversation::{Checkpoint, Conversation};
pub use cycle::CycleContext;
pub use engine::{AgentEngine, ConversationDriver, EngineSettings, NextPrompt, Verdict};
pub use explorer::ExplorerAgent;
pub use reviewer::{ReviewerAgent, ReviewerStatus};
pub use role::RoleAgent;
pub use state::{TurnEvent, TurnMode, TurnState};
pub use writer::{WriterAgent, WriterStatus};
