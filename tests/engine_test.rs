//! Conversation engine behavior seen from outside the crate

mod common;

use assertagent::agent::engine::STOP_TOOLS_PROMPT;
use assertagent::agent::{AgentEngine, ConversationDriver, CycleContext, NextPrompt, Verdict};
use assertagent::config::PipelineConfig;
use assertagent::models::{ModelResponse, ScriptedModel};
use assertagent::telemetry::ResourceLog;
use assertagent::tools::registry::GET_DEBUG_VALUE;
use assertagent::tools::{ToolExecutor, ToolHandler};
use assertagent::types::{ChatMessage, ToolCall};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Answers every lookup and counts them
#[derive(Default)]
struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolHandler for CountingHandler {
    async fn call_tool(&self, _name: &str, args: &serde_json::Value) -> assertagent::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} = 1", args["var_or_expr"].as_str().unwrap_or_default()))
    }
}

/// Takes the first reply, empty or not
struct FirstReply;

#[async_trait]
impl ConversationDriver for FirstReply {
    type Output = String;

    async fn next_prompt(&mut self, _cycle: &CycleContext) -> assertagent::Result<NextPrompt> {
        Ok(NextPrompt::Ask("What is x?".to_string()))
    }

    async fn handle_reply(
        &mut self,
        _cycle: &CycleContext,
        reply: &str,
        _text_calls: usize,
    ) -> assertagent::Result<Verdict<String>> {
        Ok(Verdict::Done(reply.to_string()))
    }
}

fn lookup(id: usize) -> ModelResponse {
    ModelResponse::tool_calls(vec![ToolCall {
        id: format!("call_{}", id),
        name: GET_DEBUG_VALUE.to_string(),
        arguments: r#"{"var_or_expr": "x"}"#.to_string(),
    }])
}

#[tokio::test]
async fn test_calls_past_the_budget_are_rolled_back_unexecuted() {
    let dir = TempDir::new().unwrap();
    let tools = common::tools(&dir, PipelineConfig::default(), ResourceLog::in_memory());
    let cycle = CycleContext::new(tools.clone(), "gen", vec![]);

    let issued = AtomicUsize::new(0);
    let model = Arc::new(ScriptedModel::from_fn(move |_, _| {
        Ok(lookup(issued.fetch_add(1, Ordering::SeqCst)))
    }));
    let handler = Arc::new(CountingHandler::default());
    let settings = common::settings(model.clone(), ResourceLog::in_memory()).with_max_tool_calls(3);
    let mut engine = AgentEngine::new("ReviewAgent", "You answer questions.", settings)
        .with_tools(ToolExecutor::new(handler.clone(), &[GET_DEBUG_VALUE]));

    let reply = engine.run(&mut FirstReply, &cycle).await.unwrap();

    // a model that never stops asking ends the turn with an empty reply
    assert_eq!(reply, "");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

    let messages = engine.conversation().messages();
    let tool_messages = messages.iter().filter(|m| matches!(m, ChatMessage::Tool { .. })).count();
    assert_eq!(tool_messages, 3);
    // discarded exchanges leave the stop prompt as the last message
    assert_eq!(messages.last(), Some(&ChatMessage::user(STOP_TOOLS_PROMPT)));
    assert_eq!(model.call_count(), 7);

    // every request the model saw stayed within the budget
    for request in model.requests() {
        let executed = request
            .messages
            .iter()
            .filter(|m| matches!(m, ChatMessage::Tool { .. }))
            .count();
        assert!(executed <= 3);
    }
    tools.close().await.unwrap();
}
