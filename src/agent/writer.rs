//! Assertion writer
//!
//! Status flow inside one cycle: `User` for the first, fully briefed
//! prompt; `Review` to relay reviewer feedback; `Retry` after a reply that
//! did not parse. After five unparseable replies in one turn the writer
//! gives up with an empty, terminating proposal.

use super::cycle::CycleContext;
use super::engine::{AgentEngine, ConversationDriver, EngineSettings, NextPrompt, Verdict, MAX_TEXT_ROUNDS};
use super::prompts::{context_sections, json_retry_prompt, parse_json_reply, task_intro, Audience, DEBUG_TOOL_NOTICE, EXPLORE_NOTICE};
use crate::errors::{AgentError, Result};
use crate::project::ProjectTools;
use crate::tools::registry::GET_DEBUG_VALUE;
use crate::tools::ToolExecutor;
use crate::types::{Language, Proposal};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub const WRITER_NAME: &str = "AssertAgent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    User,
    Review,
    Retry,
}

pub struct WriterDriver {
    status: WriterStatus,
    with_dynamic: bool,
    with_locals: bool,
    with_explore: bool,
}

impl WriterDriver {
    pub fn status(&self) -> WriterStatus {
        self.status
    }

    async fn first_prompt(&self, cycle: &CycleContext) -> Result<String> {
        let ctx = cycle.task();
        let mut prompt = task_intro(ctx, Audience::Writer);
        if self.with_explore {
            prompt.push_str(EXPLORE_NOTICE);
        }
        prompt.push_str("\nYour task is to write this assert statement.\n");

        let existing: BTreeSet<&str> = cycle.existing().iter().map(String::as_str).collect();
        if !existing.is_empty() {
            let joined = existing.into_iter().collect::<Vec<_>>().join("\n");
            prompt.push_str(&format!(
                "Here are some candidate answers, you must write one that is **completely different** from them.\n```{}\n{}\n```\n\n",
                ctx.language.fence(),
                joined.trim()
            ));
        }

        let statement = match ctx.language {
            Language::Java => "a single Java assert statement ending with a semicolon",
            Language::Python => "a single Python assert statement",
        };
        prompt.push_str(&format!(
            "Your final answer needs to be in strictly JSON dictionary format, with a field `assert_code` representing this assert statement. \
             It must be {} rather than multiple lines of code. You should write your final answer in a markdown JSON block. For example:\n\
             ```json\n{{\n    \"assert_code\": \"...\"\n}}\n```\n",
            statement
        ));

        let notes = if self.with_explore { cycle.last_explored() } else { None };
        let locals = if self.with_locals {
            match cycle.tools().get_locals().await {
                Ok(locals) => Some(locals),
                Err(e) => {
                    warn!(error = %e, "local variables unavailable, prompting without them");
                    None
                }
            }
        } else {
            None
        };
        prompt.push_str(&context_sections(ctx, notes, locals.as_deref()));
        Ok(prompt)
    }

    fn review_prompt(&self, cycle: &CycleContext) -> Result<String> {
        let review = cycle
            .last_review()
            .ok_or_else(|| AgentError::Generic("writer asked to revise without a review".to_string()))?;

        let mut prompt = if self.with_dynamic {
            "Your answer has undergone automatic static check and running, ".to_string()
        } else {
            "Your answer has undergone automatic static check, ".to_string()
        };
        prompt.push_str(&format!(
            "and the reviewer has provided some suggestions. Please try to rewrite the assert statement.\n\
             Also write it in a markdown JSON block.\n\n\n# Static Check Result\n{}\n",
            review.candidate.static_check.message
        ));
        if self.with_dynamic {
            prompt.push_str(&format!("\n\n# Test Run Result\n{}\n", review.candidate.dynamic_run.message));
        }
        prompt.push_str(&format!("\n\n# Suggestions\n{}\n", review.suggestions));
        Ok(prompt)
    }
}

#[async_trait]
impl ConversationDriver for WriterDriver {
    type Output = Proposal;

    async fn next_prompt(&mut self, cycle: &CycleContext) -> Result<NextPrompt> {
        let prompt = match self.status {
            WriterStatus::Retry => json_retry_prompt("    \"assert_code\": \"...\""),
            WriterStatus::User => self.first_prompt(cycle).await?,
            WriterStatus::Review => self.review_prompt(cycle)?,
        };
        Ok(NextPrompt::Ask(prompt))
    }

    async fn handle_reply(&mut self, _cycle: &CycleContext, reply: &str, text_calls: usize) -> Result<Verdict<Proposal>> {
        self.status = WriterStatus::Review;
        let assert_code = parse_json_reply(reply)
            .and_then(|json| json.get("assert_code").and_then(|v| v.as_str()).map(str::to_string));

        match assert_code {
            Some(assert_code) => {
                debug!(assert_code = %assert_code, "writer proposed an assertion");
                Ok(Verdict::Done(Proposal {
                    assert_code,
                    termination: false,
                }))
            }
            None if text_calls >= MAX_TEXT_ROUNDS => {
                warn!(text_calls, "writer produced no parseable answer, giving up on this cycle");
                self.status = WriterStatus::User;
                Ok(Verdict::Done(Proposal {
                    assert_code: String::new(),
                    termination: true,
                }))
            }
            None => {
                self.status = WriterStatus::Retry;
                Ok(Verdict::Retry)
            }
        }
    }
}

/// Writer agent: engine plus driver for one cycle
pub struct WriterAgent {
    engine: AgentEngine,
    driver: WriterDriver,
}

impl WriterAgent {
    /// Debug tools are offered only while dynamic verification is usable
    pub fn new(settings: EngineSettings, tools: &Arc<ProjectTools>, with_explore: bool) -> Self {
        let ctx = tools.context();
        let with_dynamic = tools.dynamic_enabled();

        let mut system_prompt = format!(
            "You are a professional software engineer.\nYou can write {} assert statements based on the method under test, unit test prefix and test setup.",
            ctx.language
        );
        let allowed: Vec<&str> = if with_dynamic {
            system_prompt.push_str(DEBUG_TOOL_NOTICE);
            vec![GET_DEBUG_VALUE]
        } else {
            Vec::new()
        };
        let handler: Arc<dyn crate::tools::ToolHandler> = tools.clone();
        let engine = AgentEngine::new(WRITER_NAME, system_prompt, settings)
            .with_tools(ToolExecutor::new(handler, &allowed));

        Self {
            engine,
            driver: WriterDriver {
                status: WriterStatus::User,
                with_dynamic,
                with_locals: tools.locals_enabled(),
                with_explore,
            },
        }
    }

    pub async fn propose(&mut self, cycle: &CycleContext) -> Result<Proposal> {
        self.engine.run(&mut self.driver, cycle).await
    }

    pub fn engine(&self) -> &AgentEngine {
        &self.engine
    }

    pub fn status(&self) -> WriterStatus {
        self.driver.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelResponse, SamplingParams, ScriptedModel};
    use crate::telemetry::ResourceLog;
    use crate::testing::{python_tools, ANSWER};
    use crate::tools::RetryManager;
    use crate::types::ChatMessage;
    use tempfile::TempDir;

    fn settings(model: Arc<ScriptedModel>) -> EngineSettings {
        EngineSettings::new(model, SamplingParams::default(), ResourceLog::in_memory())
            .with_retry(RetryManager::with_config(2, 1, 2))
    }

    fn first_user_prompt(model: &ScriptedModel) -> String {
        model.requests()[0]
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::User { content } => Some(content.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_prompt_lists_existing_candidates_once() {
        let dir = TempDir::new().unwrap();
        let tools = Arc::new(python_tools(&dir));
        let existing = vec!["assert x == 2".to_string(), "assert x == 2".to_string(), "assert x > 0".to_string()];
        let cycle = CycleContext::new(tools.clone(), "gen", existing);
        let model = Arc::new(ScriptedModel::constant(ANSWER));
        let mut writer = WriterAgent::new(settings(model.clone()), &tools, false);

        let proposal = writer.propose(&cycle).await.unwrap();
        assert_eq!(proposal.assert_code, "assert x == 1");
        assert!(!proposal.termination);
        assert_eq!(writer.status(), WriterStatus::Review);

        let prompt = first_user_prompt(&model);
        assert!(prompt.contains("**completely different**"));
        assert!(prompt.contains("```python\nassert x == 2\nassert x > 0\n```"));
        assert!(prompt.contains("# Unit Test\n...\n[3] def test_add():"));
        assert!(!prompt.contains("# Local Variable Information"));
        assert!(model.requests()[0].tools.is_empty());
        tools.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unparseable_replies_give_up_after_five_rounds() {
        let dir = TempDir::new().unwrap();
        let tools = Arc::new(python_tools(&dir));
        let cycle = CycleContext::new(tools.clone(), "gen", vec![]);
        let model = Arc::new(ScriptedModel::constant("I think x should equal one."));
        let mut writer = WriterAgent::new(settings(model.clone()), &tools, false);

        let proposal = writer.propose(&cycle).await.unwrap();
        assert_eq!(proposal.assert_code, "");
        assert!(proposal.termination);
        assert_eq!(model.call_count(), 5);
        assert_eq!(writer.status(), WriterStatus::User);

        let retry = json_retry_prompt("    \"assert_code\": \"...\"");
        let last = model.requests().pop().unwrap();
        assert_eq!(last.messages.iter().filter(|m| **m == ChatMessage::user(retry.clone())).count(), 4);
        tools.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let dir = TempDir::new().unwrap();
        let tools = Arc::new(python_tools(&dir));
        let cycle = CycleContext::new(tools.clone(), "gen", vec![]);
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::text("```json\n{\"code\": 1}\n```"),
            ModelResponse::text("{\"assert_code\": \"assert x == 1\"}"),
        ]));
        let mut writer = WriterAgent::new(settings(model.clone()), &tools, false);

        let proposal = writer.propose(&cycle).await.unwrap();
        assert_eq!(proposal.assert_code, "assert x == 1");
        assert_eq!(writer.engine().state().text_calls, 2);
        tools.close().await.unwrap();
    }
}
