//! Conversation history owned by one agent
//!
//! The history always starts with the system instructions and otherwise
//! only grows. The one exception is `rollback`, which truncates back to a
//! checkpoint taken earlier in the same turn; it is how a tool exchange
//! past the budget gets discarded.

use crate::errors::{AgentError, Result};
use crate::types::ChatMessage;

/// Length of the history at some earlier point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Start a history with its system instructions
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true: the system message is always present
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.messages.len())
    }

    /// Drop everything pushed after `checkpoint`
    ///
    /// Returns how many messages were removed.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Result<usize> {
        let Checkpoint(len) = checkpoint;
        if len == 0 || len > self.messages.len() {
            return Err(AgentError::InvalidTransition {
                from: format!("history of {} messages", self.messages.len()),
                to: format!("checkpoint at {}", len),
                reason: "Checkpoint does not belong to this history".to_string(),
            });
        }
        let removed = self.messages.len() - len;
        self.messages.truncate(len);
        Ok(removed)
    }

    /// Keep only the system message
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }
}
