//! Turn state machine for the conversation engine
//!
//! One agent turn alternates between two modes:
//! - Text: the next model call is driven by a role prompt, or the reply
//!   just received was plain text
//! - Tool: the last model call asked for tools and their results are in
//!   the history
//!
//! Counters live next to the mode so the engine and the role drivers see
//! the same numbers.

use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// Interaction mode of an agent turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TurnMode {
    #[default]
    Text,
    Tool,
}

/// Events that move a turn between modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    /// The model returned a non-empty tool call batch
    ToolCallsReceived,

    /// The model returned text, or no call was needed
    TextReceived,

    /// A tool exchange past the budget was rolled back
    ExchangeDiscarded,
}

impl TurnMode {
    /// Attempt a mode transition
    ///
    /// Valid transitions (5 edges):
    /// 1. Text → Tool (on: ToolCallsReceived)
    /// 2. Text → Text (on: TextReceived)
    /// 3. Tool → Tool (on: ToolCallsReceived | ExchangeDiscarded)
    /// 4. Tool → Text (on: TextReceived)
    /// 5. Text → error (on: ExchangeDiscarded)
    pub fn transition(&self, event: TurnEvent) -> Result<TurnMode> {
        use TurnEvent::*;
        use TurnMode::*;

        let next = match (self, event) {
            (_, ToolCallsReceived) => Tool,
            (_, TextReceived) => Text,
            (Tool, ExchangeDiscarded) => Tool,
            (from, event) => {
                return Err(AgentError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: "Only tool exchanges can be discarded".to_string(),
                })
            }
        };
        Ok(next)
    }
}

/// Counters for one agent instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnState {
    /// Engine iterations over the agent's lifetime in a cycle
    pub iters: usize,
    pub mode: TurnMode,
    /// Tool call rounds in the current turn
    pub tool_calls: usize,
    /// Text rounds in the current turn
    pub text_calls: usize,
}

impl TurnState {
    /// Reset per-turn counters; `iters` keeps counting
    pub fn begin_turn(&mut self) {
        self.mode = TurnMode::Text;
        self.tool_calls = 0;
        self.text_calls = 0;
    }

    pub fn apply(&mut self, event: TurnEvent) -> Result<()> {
        self.mode = self.mode.transition(event)?;
        match event {
            TurnEvent::ToolCallsReceived => self.tool_calls += 1,
            TurnEvent::TextReceived => self.text_calls += 1,
            TurnEvent::ExchangeDiscarded => {}
        }
        Ok(())
    }
}
