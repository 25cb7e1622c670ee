//! Message types for agent communication
//!
//! Two families live here:
//! - `ChatMessage`: role-tagged turns exchanged with the language model
//! - `AgentMessage`: payloads passed between agents along the graph

use crate::tools::types::ToolResult;
use serde::{Deserialize, Serialize};

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id echoed back in the matching result
    pub id: String,

    /// Tool name as advertised in the schema
    pub name: String,

    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

/// Assistant output: either final text or a batch of tool calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssistantContent {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

impl AssistantContent {
    /// Non-empty tool call batch, if any
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        match self {
            AssistantContent::ToolCalls(calls) if !calls.is_empty() => Some(calls),
            _ => None,
        }
    }

    /// Text view of the content; tool batches render as an empty string
    pub fn text(&self) -> &str {
        match self {
            AssistantContent::Text(text) => text,
            AssistantContent::ToolCalls(_) => "",
        }
    }
}

/// Conversation turn sent to or received from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    /// Fixed instructions, always the first message of a history
    System { content: String },

    /// Prompt turn
    User { content: String },

    /// Model output
    Assistant { content: AssistantContent },

    /// Combined results of one tool call batch
    Tool { results: Vec<ToolResult> },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User { content: content.into() }
    }

    pub fn assistant(content: AssistantContent) -> Self {
        ChatMessage::Assistant { content }
    }

    pub fn role(&self) -> &'static str {
        match self {
            ChatMessage::System { .. } => "system",
            ChatMessage::User { .. } => "user",
            ChatMessage::Assistant { .. } => "assistant",
            ChatMessage::Tool { .. } => "tool",
        }
    }
}

/// Outcome of one verification step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
}

impl CheckOutcome {
    pub fn new(passed: bool, message: impl Into<String>) -> Self {
        Self {
            passed,
            message: message.into(),
        }
    }
}

/// A generated assertion together with its verification provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Candidate {
    pub assert_code: String,
    pub static_check: CheckOutcome,
    pub dynamic_run: CheckOutcome,
}

/// Summaries produced by the explorer for one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExploreNotes {
    pub explore_focal_method: String,
    pub explore_test_prefix: String,
    pub explore_assert_style: String,
}

/// Writer output for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub assert_code: String,
    pub termination: bool,
}

/// Reviewer output for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    /// Reviewer verdict; also true when acceptance was forced
    pub decision: bool,

    /// Acceptance came from an exhausted budget, not from the model
    pub forced: bool,

    pub termination: bool,
    pub suggestions: String,
    pub candidate: Candidate,
}

/// Payload passed along the orchestration graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Pass-through starter
    Started,
    Explored(ExploreNotes),
    Proposed(Proposal),
    Reviewed(ReviewOutcome),
}

impl AgentMessage {
    /// Termination flag the graph routes on
    pub fn termination(&self) -> bool {
        match self {
            AgentMessage::Started | AgentMessage::Explored(_) => false,
            AgentMessage::Proposed(p) => p.termination,
            AgentMessage::Reviewed(r) => r.termination,
        }
    }

    /// Final assertion text carried by this message, if any
    pub fn assert_code(&self) -> Option<&str> {
        match self {
            AgentMessage::Proposed(p) => Some(&p.assert_code),
            AgentMessage::Reviewed(r) => Some(&r.candidate.assert_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serialization() {
        let msg = ChatMessage::user("write it");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "write it");

        let calls = ChatMessage::assistant(AssistantContent::ToolCalls(vec![ToolCall {
            id: "call_1".into(),
            name: "get_debug_value".into(),
            arguments: r#"{"var_or_expr": "x"}"#.into(),
        }]));
        let round: ChatMessage = serde_json::from_value(serde_json::to_value(&calls).unwrap()).unwrap();
        assert_eq!(round, calls);
    }

    #[test]
    fn test_empty_tool_batch_is_not_a_tool_call() {
        assert!(AssistantContent::ToolCalls(vec![]).tool_calls().is_none());
        assert!(AssistantContent::Text("done".into()).tool_calls().is_none());
    }

    #[test]
    fn test_agent_message_termination() {
        assert!(!AgentMessage::Started.termination());
        let proposal = AgentMessage::Proposed(Proposal {
            assert_code: String::new(),
            termination: true,
        });
        assert!(proposal.termination());
        assert_eq!(proposal.assert_code(), Some(""));
        assert_eq!(AgentMessage::Explored(ExploreNotes::default()).assert_code(), None);
    }
}
