//! OpenAI-compatible chat completion client
//!
//! Posts to `{base_url}/chat/completions` with function tool schemas and
//! sampling parameters. `top_k` and `repetition_penalty` are vLLM
//! extensions and are only sent when they change the default behavior.

use super::types::{parse_completion, to_wire_messages, ModelResponse, SamplingParams};
use crate::config::ModelConfig;
use crate::errors::{AgentError, Result};
use crate::tools::types::ToolSchema;
use crate::types::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Anything that can answer a chat completion request
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn create(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        sampling: &SamplingParams,
    ) -> Result<ModelResponse>;

    fn model_name(&self) -> &str;
}

/// HTTP client for OpenAI-compatible servers
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            model: config.model.clone(),
        })
    }

    /// JSON body for one request
    pub fn request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        sampling: &SamplingParams,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire_messages(messages),
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
            "max_completion_tokens": sampling.max_completion_tokens,
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSchema::to_openai).collect());
        }
        if sampling.top_k > 0 {
            body["top_k"] = json!(sampling.top_k);
        }
        if (sampling.repetition_penalty - 1.0).abs() > f32::EPSILON {
            body["repetition_penalty"] = json!(sampling.repetition_penalty);
        }
        if let Some(key) = &sampling.prompt_cache_key {
            body["prompt_cache_key"] = json!(key);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn create(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        sampling: &SamplingParams,
    ) -> Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, tools, sampling);
        debug!(%url, messages = messages.len(), tools = tools.len(), "posting chat completion");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::ModelApiError(format!(
                "{} returned {}: {}",
                url,
                status,
                crate::syntax::truncate_chars(&detail, 512)
            )));
        }

        let payload: Value = response.json().await?;
        parse_completion(payload)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::{ToolRegistry, RUN_TEST};

    fn client() -> OpenAiClient {
        let config = ModelConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            api_key: Some("k".to_string()),
            ..ModelConfig::default()
        };
        OpenAiClient::new(&config).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = client();
        assert_eq!(client.base_url, "http://localhost:8000/v1");
        assert_eq!(client.model_name(), ModelConfig::default().model);
    }

    #[test]
    fn test_request_body_defaults_omit_extensions() {
        let body = client().request_body(&[ChatMessage::user("hi")], &[], &SamplingParams::default());
        assert_eq!(body["messages"][0]["content"], "hi");
        assert!(body.get("tools").is_none());
        assert!(body.get("top_k").is_none());
        assert!(body.get("repetition_penalty").is_none());
        assert!(body.get("prompt_cache_key").is_none());
    }

    #[test]
    fn test_request_body_with_tools_and_sampling() {
        let registry = ToolRegistry::new();
        let tools = registry.select(&[RUN_TEST]);
        let sampling = SamplingParams {
            top_k: 20,
            repetition_penalty: 1.05,
            ..SamplingParams::default()
        }
        .with_cache_key("assertagent_3_1700000000");

        let body = client().request_body(&[ChatMessage::user("hi")], &tools, &sampling);
        assert_eq!(body["tools"][0]["function"]["name"], RUN_TEST);
        assert_eq!(body["top_k"], 20);
        assert_eq!(body["prompt_cache_key"], "assertagent_3_1700000000");
    }
}
