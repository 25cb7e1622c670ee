//! Per-cycle context shared by the agents of one graph run

use crate::errors::{AgentError, Result};
use crate::project::ProjectTools;
use crate::types::{AgentMessage, ExploreNotes, Proposal, ReviewOutcome, TaskContext};
use std::sync::Arc;

/// Everything one cycle reads, plus the messages it has produced so far
pub struct CycleContext {
    tools: Arc<ProjectTools>,
    gen_id: String,
    /// Candidates collected by earlier cycles of the same task
    existing: Vec<String>,
    messages: Vec<AgentMessage>,
}

impl CycleContext {
    pub fn new(tools: Arc<ProjectTools>, gen_id: impl Into<String>, existing: Vec<String>) -> Self {
        Self {
            tools,
            gen_id: gen_id.into(),
            existing,
            messages: Vec::new(),
        }
    }

    pub fn task(&self) -> &TaskContext {
        self.tools.context()
    }

    pub fn tools(&self) -> &ProjectTools {
        &self.tools
    }

    pub fn gen_id(&self) -> &str {
        &self.gen_id
    }

    pub fn existing(&self) -> &[String] {
        &self.existing
    }

    pub fn push(&mut self, message: AgentMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&AgentMessage> {
        self.messages.last()
    }

    pub fn last_explored(&self) -> Option<&ExploreNotes> {
        self.messages.iter().rev().find_map(|m| match m {
            AgentMessage::Explored(notes) => Some(notes),
            _ => None,
        })
    }

    /// Most recent writer proposal; reviewing without one is a graph bug
    pub fn last_proposal(&self) -> Result<&Proposal> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| match m {
                AgentMessage::Proposed(p) => Some(p),
                _ => None,
            })
            .ok_or_else(|| AgentError::Generic("no proposal to review in this cycle".to_string()))
    }

    pub fn last_review(&self) -> Option<&ReviewOutcome> {
        self.messages.iter().rev().find_map(|m| match m {
            AgentMessage::Reviewed(r) => Some(r),
            _ => None,
        })
    }
}
