//! Debugger session lifecycle
//!
//! A session is started at most once successfully and pauses at exactly
//! one line. Only a paused session answers queries.

use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// Debugger session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No process launched yet
    NotStarted,

    /// Processes launched, breakpoint not yet reached
    Starting,

    /// Halted at the placeholder line, accepting queries
    Paused,

    /// Processes released and working copy removed (terminal)
    Closed,
}

/// Events that drive the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    BreakpointHit,
    StartFailed,
    Close,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    pub fn accepts_queries(&self) -> bool {
        matches!(self, SessionState::Paused)
    }

    /// Attempt state transition with validation
    ///
    /// Valid transitions:
    /// 1. NotStarted → Starting   (on: Start)
    /// 2. Starting   → Paused     (on: BreakpointHit)
    /// 3. Starting   → NotStarted (on: StartFailed, allows another attempt)
    /// 4. \*         → Closed     (on: Close, idempotent)
    pub fn transition(&self, event: SessionEvent) -> Result<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        let next_state = match (self, event) {
            (_, Close) => Closed,
            (NotStarted, Start) => Starting,
            (Starting, BreakpointHit) => Paused,
            (Starting, StartFailed) => NotStarted,

            (from, event) => {
                return Err(AgentError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next_state)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "Not started",
            SessionState::Starting => "Starting",
            SessionState::Paused => "Paused at breakpoint",
            SessionState::Closed => "Closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SessionState::NotStarted;
        let state = state.transition(SessionEvent::Start).unwrap();
        assert_eq!(state, SessionState::Starting);
        let state = state.transition(SessionEvent::BreakpointHit).unwrap();
        assert!(state.accepts_queries());
        let state = state.transition(SessionEvent::Close).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failed_start_can_retry() {
        let state = SessionState::Starting.transition(SessionEvent::StartFailed).unwrap();
        assert_eq!(state, SessionState::NotStarted);
        assert_eq!(state.transition(SessionEvent::Start).unwrap(), SessionState::Starting);
    }

    #[test]
    fn test_single_pause_point() {
        assert!(SessionState::Paused.transition(SessionEvent::Start).is_err());
        assert!(SessionState::Paused.transition(SessionEvent::BreakpointHit).is_err());
        assert!(SessionState::Closed.transition(SessionEvent::Start).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        for state in [
            SessionState::NotStarted,
            SessionState::Starting,
            SessionState::Paused,
            SessionState::Closed,
        ] {
            assert_eq!(state.transition(SessionEvent::Close).unwrap(), SessionState::Closed);
        }
    }
}
