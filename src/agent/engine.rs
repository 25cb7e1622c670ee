//! Conversation engine shared by every role agent
//!
//! One call to `AgentEngine::run` is one agent turn. The role supplies
//! prompts and interprets replies through `ConversationDriver`; the engine
//! owns the history, the model calls and the tool rounds:
//!
//! - Text mode asks the driver for the next prompt, or lets it answer
//!   without a model call
//! - A non-empty tool call batch is executed concurrently and its results
//!   go back as one tool message
//! - Once `max_tool_calls` rounds are used up the model is told to stop;
//!   any later tool exchange is rolled back to its checkpoint
//! - Plain text goes to the driver, which either finishes the turn or asks
//!   for another round
//!
//! Transport failures are retried by `RetryManager`. Every model call is
//! written to the resource log.

use super::conversation::Conversation;
use super::cycle::CycleContext;
use super::state::{TurnEvent, TurnMode, TurnState};
use crate::config::GenerationMode;
use crate::errors::{AgentError, Result};
use crate::models::{ChatModel, ModelResponse, SamplingParams};
use crate::telemetry::ResourceLog;
use crate::tools::{RetryManager, ToolExecutor, ToolResult, ToolSchema};
use crate::types::{ChatMessage, ToolCall};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Sent once the tool budget of a turn is used up
pub const STOP_TOOLS_PROMPT: &str = "Okay, please stop calling tools now and provide the final answer.";

/// Rolled back exchanges in a row before the reply counts as empty text
pub const MAX_DISCARDED_EXCHANGES: usize = 3;

/// Text rounds a role driver allows before giving up on a parseable answer
pub const MAX_TEXT_ROUNDS: usize = 5;

/// What a role wants to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPrompt {
    /// Send this prompt to the model
    Ask(String),
    /// Skip the model and hand this text straight back as the reply
    Skip(String),
}

/// How a role judged a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    /// Prompt again
    Retry,
    /// The turn is over
    Done(T),
}

/// Role-specific half of an agent turn
#[async_trait]
pub trait ConversationDriver: Send {
    type Output: Send;

    async fn next_prompt(&mut self, cycle: &CycleContext) -> Result<NextPrompt>;

    /// `text_calls` counts text rounds of this turn, this one included
    async fn handle_reply(
        &mut self,
        cycle: &CycleContext,
        reply: &str,
        text_calls: usize,
    ) -> Result<Verdict<Self::Output>>;
}

/// Model access and limits shared by the agents of a task
#[derive(Clone)]
pub struct EngineSettings {
    pub model: Arc<dyn ChatModel>,
    pub sampling: SamplingParams,
    pub generation_mode: GenerationMode,
    pub max_tool_calls: usize,
    pub retry: RetryManager,
    pub log: ResourceLog,
    pub cancel: CancellationToken,
}

impl EngineSettings {
    pub fn new(model: Arc<dyn ChatModel>, sampling: SamplingParams, log: ResourceLog) -> Self {
        Self {
            model,
            sampling,
            generation_mode: GenerationMode::Default,
            max_tool_calls: 5,
            retry: RetryManager::new(),
            log,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_generation_mode(mut self, mode: GenerationMode) -> Self {
        self.generation_mode = mode;
        self
    }

    pub fn with_max_tool_calls(mut self, max_tool_calls: usize) -> Self {
        self.max_tool_calls = max_tool_calls;
        self
    }

    pub fn with_retry(mut self, retry: RetryManager) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// History, counters and tools of one agent instance
pub struct AgentEngine {
    name: &'static str,
    settings: EngineSettings,
    executor: Option<ToolExecutor>,
    schemas: Vec<ToolSchema>,
    conversation: Conversation,
    state: TurnState,
}

impl AgentEngine {
    pub fn new(name: &'static str, system_prompt: impl Into<String>, settings: EngineSettings) -> Self {
        Self {
            name,
            settings,
            executor: None,
            schemas: Vec::new(),
            conversation: Conversation::new(system_prompt),
            state: TurnState::default(),
        }
    }

    /// Advertise and execute the executor's tools; an empty executor is ignored
    pub fn with_tools(mut self, executor: ToolExecutor) -> Self {
        if !executor.is_empty() {
            self.schemas = executor.schemas();
            self.executor = Some(executor);
        }
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    /// Drive one turn to the driver's final output
    pub async fn run<D: ConversationDriver>(&mut self, driver: &mut D, cycle: &CycleContext) -> Result<D::Output> {
        self.state.begin_turn();
        let mut stop_sent = false;
        let mut discarded = 0usize;

        loop {
            self.state.iters += 1;

            match self.state.mode {
                TurnMode::Text => match driver.next_prompt(cycle).await? {
                    NextPrompt::Skip(text) => {
                        self.state.apply(TurnEvent::TextReceived)?;
                        match driver.handle_reply(cycle, &text, self.state.text_calls).await? {
                            Verdict::Done(output) => return Ok(output),
                            Verdict::Retry => continue,
                        }
                    }
                    NextPrompt::Ask(prompt) => {
                        let prompt = self.settings.generation_mode.apply(&prompt);
                        self.conversation.push(ChatMessage::user(prompt));
                        // a fresh prompt earns its own stop notice
                        stop_sent = false;
                    }
                },
                TurnMode::Tool => {
                    if self.state.tool_calls >= self.settings.max_tool_calls && !stop_sent {
                        let prompt = self.settings.generation_mode.apply(STOP_TOOLS_PROMPT);
                        self.conversation.push(ChatMessage::user(prompt));
                        stop_sent = true;
                    }
                }
            }

            let checkpoint = self.conversation.checkpoint();
            let response = self.call_model().await?;

            if let Some(calls) = response.content.tool_calls() {
                let calls: Vec<ToolCall> = calls.to_vec();
                self.state.apply(TurnEvent::ToolCallsReceived)?;

                if self.state.tool_calls > self.settings.max_tool_calls {
                    self.conversation.rollback(checkpoint)?;
                    self.state.apply(TurnEvent::ExchangeDiscarded)?;
                    discarded += 1;
                    debug!(agent = self.name, discarded, "tool call past the budget rolled back");

                    if discarded > MAX_DISCARDED_EXCHANGES {
                        warn!(agent = self.name, "model keeps calling tools, treating the reply as empty text");
                        discarded = 0;
                        self.state.apply(TurnEvent::TextReceived)?;
                        if let Verdict::Done(output) = driver.handle_reply(cycle, "", self.state.text_calls).await? {
                            return Ok(output);
                        }
                    }
                    continue;
                }

                let results = self.execute_tools(&calls).await;
                self.conversation.push(ChatMessage::Tool { results });
                continue;
            }

            self.state.apply(TurnEvent::TextReceived)?;
            let reply = response.content.text().to_string();
            if let Verdict::Done(output) = driver.handle_reply(cycle, &reply, self.state.text_calls).await? {
                return Ok(output);
            }
        }
    }

    /// Single-turn exchange over a fresh history: system prompt plus `prompt`
    pub async fn ask_once(&mut self, prompt: &str) -> Result<String> {
        self.conversation.reset();
        self.state.iters += 1;
        let prompt = self.settings.generation_mode.apply(prompt);
        self.conversation.push(ChatMessage::user(prompt));
        let response = self.call_model().await?;
        Ok(response.content.text().to_string())
    }

    /// One model call with retries; the reply is appended and logged
    async fn call_model(&mut self) -> Result<ModelResponse> {
        let start = Instant::now();
        let response = {
            let settings = &self.settings;
            let messages = self.conversation.messages();
            let schemas = self.schemas.as_slice();
            settings
                .retry
                .execute_with_retry(move || async move {
                    tokio::select! {
                        biased;
                        _ = settings.cancel.cancelled() => Err(AgentError::Cancelled),
                        reply = settings.model.create(messages, schemas, &settings.sampling) => reply,
                    }
                })
                .await?
        };
        let seconds = start.elapsed().as_secs_f64();

        self.conversation.push(ChatMessage::assistant(response.content.clone()));
        self.settings.log.record_llm(
            self.name,
            self.state.iters,
            response.usage,
            self.conversation.messages(),
            seconds,
        );
        debug!(
            agent = self.name,
            iters = self.state.iters,
            tokens = response.usage.total_tokens,
            seconds,
            "model call finished"
        );
        Ok(response)
    }

    async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        match &self.executor {
            Some(executor) => {
                let results = executor.execute_batch(calls).await;
                let stats = executor.stats();
                debug!(
                    agent = self.name,
                    executions = stats.total_executions,
                    failed = stats.failed_executions,
                    success_rate = stats.success_rate(),
                    avg_ms = stats.average_duration_ms(),
                    "tool batch finished"
                );
                results
            }
            None => calls
                .iter()
                .map(|call| {
                    ToolResult::failure(&call.id, &call.name, format!("Unknown tool: {}", call.name), Duration::ZERO)
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScriptedModel;
    use crate::testing::{python_tools, ANSWER};
    use crate::tools::registry::GET_DEBUG_VALUE;
    use crate::types::AssistantContent;
    use tempfile::TempDir;

    /// Accepts the first non-empty reply, gives up after two empty ones
    struct EchoDriver {
        prompts: usize,
    }

    #[async_trait]
    impl ConversationDriver for EchoDriver {
        type Output = String;

        async fn next_prompt(&mut self, _cycle: &CycleContext) -> Result<NextPrompt> {
            self.prompts += 1;
            Ok(NextPrompt::Ask(format!("prompt {}", self.prompts)))
        }

        async fn handle_reply(&mut self, _cycle: &CycleContext, reply: &str, text_calls: usize) -> Result<Verdict<String>> {
            if !reply.is_empty() {
                Ok(Verdict::Done(reply.to_string()))
            } else if text_calls >= 2 {
                Ok(Verdict::Done("gave up".to_string()))
            } else {
                Ok(Verdict::Retry)
            }
        }
    }

    fn debug_call(id: usize) -> ModelResponse {
        ModelResponse::tool_calls(vec![ToolCall {
            id: format!("call_{}", id),
            name: GET_DEBUG_VALUE.to_string(),
            arguments: r#"{"var_or_expr": "x"}"#.to_string(),
        }])
    }

    fn settings(model: Arc<ScriptedModel>, max_tool_calls: usize) -> EngineSettings {
        EngineSettings::new(model, SamplingParams::default(), ResourceLog::in_memory())
            .with_max_tool_calls(max_tool_calls)
            .with_retry(RetryManager::with_config(2, 1, 2))
    }

    fn user_prompts(messages: &[ChatMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                ChatMessage::User { content } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_text_reply_ends_turn() {
        let dir = TempDir::new().unwrap();
        let cycle = CycleContext::new(Arc::new(python_tools(&dir)), "gen", vec![]);
        let model = Arc::new(ScriptedModel::constant(ANSWER));
        let mut engine = AgentEngine::new("AssertAgent", "sys", settings(model.clone(), 5));

        let out = engine.run(&mut EchoDriver { prompts: 0 }, &cycle).await.unwrap();
        assert_eq!(out, ANSWER);
        assert_eq!(engine.conversation().len(), 3);
        assert_eq!(engine.state().text_calls, 1);
        assert_eq!(model.call_count(), 1);
        cycle.tools().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_tool_budget_is_enforced() {
        let dir = TempDir::new().unwrap();
        let tools = Arc::new(python_tools(&dir));
        let cycle = CycleContext::new(tools.clone(), "gen", vec![]);
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let model = Arc::new(ScriptedModel::from_fn(move |_, _| {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(debug_call(n))
        }));
        let executor = ToolExecutor::new(tools.clone(), &[GET_DEBUG_VALUE]);
        let mut engine = AgentEngine::new("ReviewAgent", "sys", settings(model.clone(), 2)).with_tools(executor);

        let out = engine.run(&mut EchoDriver { prompts: 0 }, &cycle).await.unwrap();
        assert_eq!(out, "gave up");

        let messages = engine.conversation().messages();
        // the driver's retry prompt is followed by a fresh stop notice
        let prompts = user_prompts(messages);
        let stops = prompts.iter().filter(|p| p.as_str() == STOP_TOOLS_PROMPT).count();
        assert_eq!(stops, 2);
        assert_eq!(
            prompts,
            vec!["prompt 1", STOP_TOOLS_PROMPT, "prompt 2", STOP_TOOLS_PROMPT]
        );

        // two executed tool exchanges, nothing after the stop prompt
        let tool_messages = messages.iter().filter(|m| matches!(m, ChatMessage::Tool { .. })).count();
        assert_eq!(tool_messages, 2);
        assert!(engine.conversation().len() <= 10);

        // the stop prompt arrives on the call after the budget is used
        let requests = model.requests();
        assert_eq!(requests[2].messages.last(), Some(&ChatMessage::user(STOP_TOOLS_PROMPT)));
        assert!(requests.iter().all(|r| r.messages.len() <= 10));
        tools.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let dir = TempDir::new().unwrap();
        let cycle = CycleContext::new(Arc::new(python_tools(&dir)), "gen", vec![]);
        let model = Arc::new(ScriptedModel::new(vec![debug_call(0), ModelResponse::text(ANSWER)]));
        let mut engine = AgentEngine::new("AssertAgent", "sys", settings(model, 5));

        let out = engine.run(&mut EchoDriver { prompts: 0 }, &cycle).await.unwrap();
        assert_eq!(out, ANSWER);
        let tool_message = engine
            .conversation()
            .messages()
            .iter()
            .find_map(|m| match m {
                ChatMessage::Tool { results } => Some(results.clone()),
                _ => None,
            })
            .unwrap();
        assert!(tool_message[0].is_error);
        assert!(tool_message[0].content.contains("Unknown tool"));
        cycle.tools().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_generation_mode_suffix_on_prompts() {
        let dir = TempDir::new().unwrap();
        let cycle = CycleContext::new(Arc::new(python_tools(&dir)), "gen", vec![]);
        let model = Arc::new(ScriptedModel::constant(ANSWER));
        let settings = settings(model.clone(), 5).with_generation_mode(GenerationMode::NoThink);
        let mut engine = AgentEngine::new("AssertAgent", "sys", settings);

        engine.run(&mut EchoDriver { prompts: 0 }, &cycle).await.unwrap();
        assert_eq!(user_prompts(engine.conversation().messages()), vec!["prompt 1 /no_think"]);
        cycle.tools().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_call_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let cycle = CycleContext::new(Arc::new(python_tools(&dir)), "gen", vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let model = Arc::new(ScriptedModel::constant(ANSWER));
        let mut engine = AgentEngine::new("AssertAgent", "sys", settings(model, 5).with_cancel(cancel));

        let err = engine.run(&mut EchoDriver { prompts: 0 }, &cycle).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        cycle.tools().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_ask_once_starts_fresh() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::text("first"),
            ModelResponse::text("second"),
        ]));
        let log = ResourceLog::in_memory();
        let settings = EngineSettings::new(model.clone(), SamplingParams::default(), log.clone());
        let mut engine = AgentEngine::new("ExploreAgent", "summarize", settings);

        assert_eq!(engine.ask_once("a").await.unwrap(), "first");
        assert_eq!(engine.ask_once("b").await.unwrap(), "second");
        assert_eq!(engine.conversation().len(), 3);
        assert_eq!(
            engine.conversation().last(),
            Some(&ChatMessage::assistant(AssistantContent::Text("second".into())))
        );
        assert_eq!(log.stats().llm_calls, 2);
    }
}
