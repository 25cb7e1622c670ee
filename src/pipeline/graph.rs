//! Orchestration graph for one cycle
//!
//! Fixed topology: starter (explorer or pass-through) → writer → reviewer,
//! with the reviewer looping back to the writer until some message
//! carries `termination = true`. Routing is a transition table over named
//! states rather than edge predicates.

use crate::agent::{EngineSettings, ExplorerAgent, ReviewerAgent, RoleAgent, WriterAgent};
use crate::agent::CycleContext;
use crate::config::PipelineConfig;
use crate::errors::{AgentError, Result};
use crate::project::ProjectTools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Graph position within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphState {
    Explore,
    Write,
    Review,
    /// Terminal
    Done,
}

impl GraphState {
    /// Next state given the termination flag of the message just emitted
    ///
    /// Valid transitions (7 edges):
    /// 1. Explore → Write  (termination = false)
    /// 2. Write   → Review (termination = false)
    /// 3. Review  → Write  (termination = false)
    /// 4. Explore → Done   (termination = true)
    /// 5. Write   → Done   (termination = true)
    /// 6. Review  → Done   (termination = true)
    /// 7. Done    → error
    pub fn next(&self, termination: bool) -> Result<GraphState> {
        use GraphState::*;

        let next = match (self, termination) {
            (Done, _) => {
                return Err(AgentError::InvalidTransition {
                    from: "Done".to_string(),
                    to: format!("(termination = {})", termination),
                    reason: "Cycle already finished".to_string(),
                })
            }
            (_, true) => Done,
            (Explore, false) => Write,
            (Write, false) => Review,
            (Review, false) => Write,
        };
        Ok(next)
    }

    pub fn is_terminal(&self) -> bool {
        *self == GraphState::Done
    }
}

/// The three agents of one cycle, built fresh per cycle
pub struct CycleGraph {
    starter: RoleAgent,
    writer: RoleAgent,
    reviewer: RoleAgent,
}

impl CycleGraph {
    pub fn new(starter: RoleAgent, writer: RoleAgent, reviewer: RoleAgent) -> Self {
        Self {
            starter,
            writer,
            reviewer,
        }
    }

    /// Agents configured from the pipeline switches
    pub fn build(settings: &EngineSettings, tools: &Arc<ProjectTools>, pipeline: &PipelineConfig) -> Self {
        let starter = if pipeline.with_explore_agent {
            RoleAgent::Explorer(ExplorerAgent::new(
                settings.clone(),
                tools.context().language,
                pipeline.max_callees,
                pipeline.max_style_functions,
            ))
        } else {
            RoleAgent::PassThrough
        };
        let writer = RoleAgent::Writer(WriterAgent::new(settings.clone(), tools, pipeline.with_explore_agent));
        let reviewer = RoleAgent::Reviewer(ReviewerAgent::new(
            settings.clone(),
            tools,
            pipeline.max_reviews,
            pipeline.with_explore_agent,
        ));
        Self::new(starter, writer, reviewer)
    }

    fn agent_for(&mut self, state: GraphState) -> Option<&mut RoleAgent> {
        match state {
            GraphState::Explore => Some(&mut self.starter),
            GraphState::Write => Some(&mut self.writer),
            GraphState::Review => Some(&mut self.reviewer),
            GraphState::Done => None,
        }
    }

    /// Run until termination; returns the final candidate, empty on failure
    pub async fn run(&mut self, cycle: &mut CycleContext) -> Result<String> {
        let mut state = GraphState::Explore;

        while let Some(agent) = self.agent_for(state) {
            let message = agent.respond(cycle).await?;
            let termination = message.termination();
            debug!(agent = agent.name(), ?state, termination, "graph step");
            cycle.push(message);
            state = state.next(termination)?;
        }

        Ok(cycle
            .last()
            .and_then(|m| m.assert_code())
            .unwrap_or_default()
            .to_string())
    }
}
