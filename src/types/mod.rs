//! Type definitions module
//!
//! Task context, chat turns and inter-agent payloads.

pub mod messages;
pub mod task;

// Re-export commonly used types
pub use messages::{
    AgentMessage, AssistantContent, Candidate, ChatMessage, CheckOutcome, ExploreNotes, Proposal,
    ReviewOutcome, ToolCall,
};
pub use task::{CodeFragment, Language, TaskContext, TaskRecord};
