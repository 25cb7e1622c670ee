//! Reviewer
//!
//! Each `Recv` round verifies the latest proposal (static check, then a
//! real test run when dynamic verification is on and the static check
//! passed) and asks the model for a `{decision, suggestions}` verdict.
//! The first round carries the whole task; later rounds only the revised
//! candidate.
//!
//! The review budget is the one bound on a cycle: once `max_reviews`
//! verdicts have been given, the next round accepts the current candidate
//! without calling the model. Five unparseable replies in one turn are
//! also treated as acceptance.

use super::cycle::CycleContext;
use super::engine::{AgentEngine, ConversationDriver, EngineSettings, NextPrompt, Verdict, MAX_TEXT_ROUNDS};
use super::prompts::{
    context_sections, json_retry_prompt, parse_json_reply, task_intro, Audience, DEBUG_TOOL_NOTICE, EXPLORE_NOTICE,
    STATIC_FAILED_RUN,
};
use crate::errors::Result;
use crate::project::ProjectTools;
use crate::tools::registry::GET_DEBUG_VALUE;
use crate::tools::{ToolExecutor, ToolHandler};
use crate::types::{Candidate, CheckOutcome, ReviewOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const REVIEWER_NAME: &str = "ReviewAgent";

/// Test run result when the budget ran out before the candidate was run
pub const BUDGET_EXHAUSTED_RUN: &str = "Review budget exhausted, did not start running.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewerStatus {
    Recv,
    Retry,
}

pub struct ReviewerDriver {
    status: ReviewerStatus,
    reviews: usize,
    max_reviews: usize,
    briefed: bool,
    forced: bool,
    with_dynamic: bool,
    with_locals: bool,
    with_explore: bool,
    candidate: Candidate,
}

impl ReviewerDriver {
    pub fn reviews(&self) -> usize {
        self.reviews
    }

    /// Static check, then a real run when it passed and dynamic runs are on
    async fn verify(&self, cycle: &CycleContext, assert_code: &str) -> Result<Candidate> {
        let tools = cycle.tools();
        let static_check = tools.static_check_assert(assert_code);
        let dynamic_run = if !static_check.passed {
            CheckOutcome::new(false, STATIC_FAILED_RUN)
        } else if !self.with_dynamic {
            CheckOutcome::new(true, "")
        } else {
            let normalized = cycle.task().language.normalize_assert(assert_code);
            let run = tools.run_test(&normalized).await?;
            CheckOutcome::new(run.passed, run.message)
        };
        Ok(Candidate {
            assert_code: assert_code.to_string(),
            static_check,
            dynamic_run,
        })
    }

    /// Like `verify`, but never starts a new test run
    fn verify_cached(&self, cycle: &CycleContext, assert_code: &str) -> Candidate {
        let tools = cycle.tools();
        let static_check = tools.static_check_assert(assert_code);
        let dynamic_run = if !static_check.passed {
            CheckOutcome::new(false, STATIC_FAILED_RUN)
        } else if !self.with_dynamic {
            CheckOutcome::new(true, "")
        } else {
            let normalized = cycle.task().language.normalize_assert(assert_code);
            match tools.cached_run(&normalized) {
                Some(run) => CheckOutcome::new(run.passed, run.message),
                None => CheckOutcome::new(false, BUDGET_EXHAUSTED_RUN),
            }
        };
        Candidate {
            assert_code: assert_code.to_string(),
            static_check,
            dynamic_run,
        }
    }

    fn verification_note(&self) -> &'static str {
        if self.with_dynamic {
            "It has undergone automatic static check and running.\n"
        } else {
            "It has undergone automatic static check.\n"
        }
    }

    async fn briefing_prompt(&self, cycle: &CycleContext) -> String {
        let ctx = cycle.task();
        let mut prompt = task_intro(ctx, Audience::Reviewer);
        if self.with_explore {
            prompt.push_str(EXPLORE_NOTICE);
        }
        prompt.push_str(
            "\nYour final result needs to be in strictly JSON dictionary type, which includes a boolean type field `decision` \
             indicating whether the assert statement is correct (true means correct), and a string type field `suggestions` \
             indicating your suggestions. For example:\n```json\n{\n    \"decision\": ...,\n    \"suggestions\": \"...\"\n}\n```\n",
        );

        let notes = if self.with_explore { cycle.last_explored() } else { None };
        let locals = if self.with_locals {
            cycle.tools().get_locals().await.ok()
        } else {
            None
        };
        prompt.push_str(&context_sections(ctx, notes, locals.as_deref()));

        prompt.push_str("\n\n# Answer to Check\nHere is the programmer's answer. ");
        prompt.push_str(self.verification_note());
        prompt.push_str(&format!(
            "Please check if it is correct and provide suggestions.\n\n```{}\n{}\n```\n\n\n# Static Check Result\n{}\n",
            ctx.language.fence(),
            self.candidate.assert_code,
            self.candidate.static_check.message
        ));
        if self.with_dynamic {
            prompt.push_str(&format!("\n\n# Test Run Result\n{}\n", self.candidate.dynamic_run.message));
        }
        prompt
    }

    fn revision_prompt(&self, cycle: &CycleContext) -> String {
        let mut prompt = "The programmer has revised and written a new version. ".to_string();
        prompt.push_str(self.verification_note());
        prompt.push_str(&format!(
            "Please check again if it is correct and provide suggestions.\n\
             Your check result needs to be strictly JSON type, which includes a boolean type field `decision` indicating \
             whether the assert statement is correct, and a string type field `suggestions` indicating your modification suggestions.\n\n\
             ```{}\n{}\n```\n\n\n# Static Check Result\n{}\n\n\n# Test Run Result\n{}\n",
            cycle.task().language.fence(),
            self.candidate.assert_code,
            self.candidate.static_check.message,
            self.candidate.dynamic_run.message
        ));
        prompt
    }

    /// Outcome carrying the current candidate, its code normalized
    fn outcome(&self, cycle: &CycleContext, decision: bool, forced: bool, suggestions: String) -> ReviewOutcome {
        let mut candidate = self.candidate.clone();
        candidate.assert_code = cycle.task().language.normalize_assert(&candidate.assert_code);
        ReviewOutcome {
            decision,
            forced,
            termination: decision || forced,
            suggestions,
            candidate,
        }
    }
}

#[async_trait]
impl ConversationDriver for ReviewerDriver {
    type Output = ReviewOutcome;

    async fn next_prompt(&mut self, cycle: &CycleContext) -> Result<NextPrompt> {
        if self.status == ReviewerStatus::Retry {
            return Ok(NextPrompt::Ask(json_retry_prompt(
                "    \"decision\": ...,\n    \"suggestions\": \"...\"",
            )));
        }

        let assert_code = cycle.last_proposal()?.assert_code.clone();
        if self.reviews >= self.max_reviews {
            info!(reviews = self.reviews, "review budget exhausted, accepting current candidate");
            self.forced = true;
            self.candidate = self.verify_cached(cycle, &assert_code);
            return Ok(NextPrompt::Skip("termination".to_string()));
        }

        self.candidate = self.verify(cycle, &assert_code).await?;
        debug!(
            static_passed = self.candidate.static_check.passed,
            run_passed = self.candidate.dynamic_run.passed,
            "candidate verified"
        );

        let prompt = if self.briefed {
            self.revision_prompt(cycle)
        } else {
            self.briefed = true;
            self.briefing_prompt(cycle).await
        };
        Ok(NextPrompt::Ask(prompt))
    }

    async fn handle_reply(&mut self, cycle: &CycleContext, reply: &str, text_calls: usize) -> Result<Verdict<ReviewOutcome>> {
        if self.forced {
            return Ok(Verdict::Done(self.outcome(cycle, true, true, String::new())));
        }

        self.reviews += 1;
        self.status = ReviewerStatus::Recv;
        let verdict = parse_json_reply(reply).and_then(|json| {
            let decision = json.get("decision")?.as_bool()?;
            let suggestions = match json.get("suggestions") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            Some((decision, suggestions))
        });

        match verdict {
            Some((decision, suggestions)) => {
                debug!(decision, reviews = self.reviews, "review verdict");
                Ok(Verdict::Done(self.outcome(cycle, decision, false, suggestions)))
            }
            None if text_calls >= MAX_TEXT_ROUNDS => {
                warn!(text_calls, "reviewer produced no parseable verdict, accepting candidate");
                Ok(Verdict::Done(self.outcome(cycle, true, true, String::new())))
            }
            None => {
                self.status = ReviewerStatus::Retry;
                Ok(Verdict::Retry)
            }
        }
    }
}

pub struct ReviewerAgent {
    engine: AgentEngine,
    driver: ReviewerDriver,
}

impl ReviewerAgent {
    pub fn new(settings: EngineSettings, tools: &Arc<ProjectTools>, max_reviews: usize, with_explore: bool) -> Self {
        let with_dynamic = tools.dynamic_enabled();
        let mut system_prompt = "You are a professional software reviewer.\n\
             You can determine whether the assert statement written by the programmer is correct based on static check result and test run result."
            .to_string();
        let allowed: Vec<&str> = if with_dynamic {
            system_prompt.push_str(DEBUG_TOOL_NOTICE);
            vec![GET_DEBUG_VALUE]
        } else {
            Vec::new()
        };
        let handler: Arc<dyn ToolHandler> = tools.clone();
        let engine = AgentEngine::new(REVIEWER_NAME, system_prompt, settings)
            .with_tools(ToolExecutor::new(handler, &allowed));

        Self {
            engine,
            driver: ReviewerDriver {
                status: ReviewerStatus::Recv,
                reviews: 0,
                max_reviews,
                briefed: false,
                forced: false,
                with_dynamic,
                with_locals: tools.locals_enabled(),
                with_explore,
                candidate: Candidate::default(),
            },
        }
    }

    pub async fn review(&mut self, cycle: &CycleContext) -> Result<ReviewOutcome> {
        self.engine.run(&mut self.driver, cycle).await
    }

    pub fn reviews(&self) -> usize {
        self.driver.reviews()
    }

    pub fn engine(&self) -> &AgentEngine {
        &self.engine
    }
}
