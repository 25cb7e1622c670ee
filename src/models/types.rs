//! Type definitions for chat completion transport
//!
//! This module defines the request/response data that crosses the model
//! boundary and the conversion to and from the OpenAI-compatible wire
//! format spoken by vLLM and hosted endpoints alike.

use crate::errors::{AgentError, Result};
use crate::types::{AssistantContent, ChatMessage, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::ops::AddAssign;

/// Token accounting reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Sampling parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_completion_tokens: u32,

    /// Server-side extension; -1 disables
    pub top_k: i32,

    /// Server-side extension; 1.0 disables
    pub repetition_penalty: f32,

    /// Groups requests of one task for prefix caching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_cache_key: Option<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            max_completion_tokens: 1024,
            top_k: -1,
            repetition_penalty: 1.0,
            prompt_cache_key: None,
        }
    }
}

impl SamplingParams {
    pub fn from_config(model: &crate::config::ModelConfig) -> Self {
        Self {
            temperature: model.temperature,
            top_p: model.top_p,
            max_completion_tokens: model.max_tokens,
            top_k: model.top_k,
            repetition_penalty: model.repetition_penalty,
            prompt_cache_key: None,
        }
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.prompt_cache_key = Some(key.into());
        self
    }
}

/// One model reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: AssistantContent,
    #[serde(default)]
    pub usage: Usage,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: AssistantContent::Text(text.into()),
            usage: Usage::default(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: AssistantContent::ToolCalls(calls),
            usage: Usage::default(),
        }
    }
}

/// Render history as OpenAI chat messages
///
/// A combined tool message expands into one `tool` entry per result.
pub fn to_wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            ChatMessage::System { content } => wire.push(json!({"role": "system", "content": content})),
            ChatMessage::User { content } => wire.push(json!({"role": "user", "content": content})),
            ChatMessage::Assistant { content } => match content {
                AssistantContent::Text(text) => {
                    wire.push(json!({"role": "assistant", "content": text}))
                }
                AssistantContent::ToolCalls(calls) => {
                    let calls: Vec<Value> = calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": {"name": c.name, "arguments": c.arguments}
                            })
                        })
                        .collect();
                    wire.push(json!({"role": "assistant", "content": Value::Null, "tool_calls": calls}));
                }
            },
            ChatMessage::Tool { results } => {
                for result in results {
                    wire.push(json!({
                        "role": "tool",
                        "tool_call_id": result.call_id,
                        "content": result.content,
                    }));
                }
            }
        }
    }
    wire
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Decode a `/chat/completions` response body
pub fn parse_completion(body: Value) -> Result<ModelResponse> {
    let body: CompletionBody = serde_json::from_value(body)?;
    let message = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::ModelApiError("response has no choices".to_string()))?
        .message;

    let content = match message.tool_calls {
        Some(calls) if !calls.is_empty() => AssistantContent::ToolCalls(
            calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect(),
        ),
        _ => AssistantContent::Text(message.content.unwrap_or_default()),
    };

    Ok(ModelResponse {
        content,
        usage: body.usage.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::ToolResult;
    use std::time::Duration;

    #[test]
    fn test_tool_batch_expands_on_the_wire() {
        let history = vec![
            ChatMessage::system("sys"),
            ChatMessage::assistant(AssistantContent::ToolCalls(vec![
                ToolCall { id: "a".into(), name: "get_locals".into(), arguments: "{}".into() },
                ToolCall { id: "b".into(), name: "get_debug_value".into(), arguments: "{}".into() },
            ])),
            ChatMessage::Tool {
                results: vec![
                    ToolResult::success("a", "get_locals", "x = 1", Duration::ZERO),
                    ToolResult::failure("b", "get_debug_value", "boom", Duration::ZERO),
                ],
            },
        ];
        let wire = to_wire_messages(&history);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[1]["tool_calls"][1]["function"]["name"], "get_debug_value");
        assert_eq!(wire[2]["tool_call_id"], "a");
        assert_eq!(wire[3]["content"], "boom");
    }

    #[test]
    fn test_parse_text_and_tool_calls() {
        let text = parse_completion(json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        }))
        .unwrap();
        assert_eq!(text.content, AssistantContent::Text("hi".into()));
        assert_eq!(text.usage.total_tokens, 12);

        let calls = parse_completion(json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "run_test", "arguments": "{\"assert_code\": \"assert x\"}"}}
            ]}}]
        }))
        .unwrap();
        assert_eq!(calls.content.tool_calls().map(|c| c.len()), Some(1));
        assert_eq!(calls.usage, Usage::default());

        assert!(parse_completion(json!({"choices": []})).is_err());
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = Usage::default();
        total += Usage { prompt_tokens: 3, completion_tokens: 1, total_tokens: 4 };
        total += Usage { prompt_tokens: 2, completion_tokens: 2, total_tokens: 4 };
        assert_eq!(total.total_tokens, 8);
        assert_eq!(total.prompt_tokens, 5);
    }
}
