//! The closed set of roles a graph node can play

use super::cycle::CycleContext;
use super::explorer::{ExplorerAgent, EXPLORER_NAME};
use super::reviewer::{ReviewerAgent, REVIEWER_NAME};
use super::writer::{WriterAgent, WRITER_NAME};
use crate::errors::Result;
use crate::types::AgentMessage;

pub const PASS_NAME: &str = "PassAgent";

pub enum RoleAgent {
    Explorer(ExplorerAgent),
    Writer(WriterAgent),
    Reviewer(ReviewerAgent),
    /// Starts a cycle without exploring
    PassThrough,
}

impl RoleAgent {
    pub fn name(&self) -> &'static str {
        match self {
            RoleAgent::Explorer(_) => EXPLORER_NAME,
            RoleAgent::Writer(_) => WRITER_NAME,
            RoleAgent::Reviewer(_) => REVIEWER_NAME,
            RoleAgent::PassThrough => PASS_NAME,
        }
    }

    /// Run one turn and wrap its output for the graph
    pub async fn respond(&mut self, cycle: &CycleContext) -> Result<AgentMessage> {
        let message = match self {
            RoleAgent::Explorer(agent) => AgentMessage::Explored(agent.explore(cycle).await?),
            RoleAgent::Writer(agent) => AgentMessage::Proposed(agent.propose(cycle).await?),
            RoleAgent::Reviewer(agent) => AgentMessage::Reviewed(agent.review(cycle).await?),
            RoleAgent::PassThrough => AgentMessage::Started,
        };
        Ok(message)
    }
}
