//! Deterministic replay model
//!
//! Answers from a fixed script or a responder function and records every
//! request it receives. Used for offline dry runs and throughout the
//! tests.

use super::client::ChatModel;
use super::types::{ModelResponse, SamplingParams};
use crate::errors::{AgentError, Result};
use crate::tools::types::ToolSchema;
use crate::types::ChatMessage;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&[ChatMessage], &[ToolSchema]) -> Result<ModelResponse> + Send + Sync>;

enum Script {
    /// Replies in order; the last one repeats once the queue runs dry
    Queue(Mutex<VecDeque<ModelResponse>>),
    Responder(Responder),
}

/// One recorded request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

pub struct ScriptedModel {
    script: Script,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelResponse>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(replies.into())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text
    pub fn constant(text: impl Into<String>) -> Self {
        Self::new(vec![ModelResponse::text(text)])
    }

    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage], &[ToolSchema]) -> Result<ModelResponse> + Send + Sync + 'static,
    {
        Self {
            script: Script::Responder(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Load replies from a JSONL file of `ModelResponse` objects
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let replies = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str::<ModelResponse>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if replies.is_empty() {
            return Err(AgentError::ConfigError(format!(
                "replay file {} has no responses",
                path.display()
            )));
        }
        Ok(Self::new(replies))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn create(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        _sampling: &SamplingParams,
    ) -> Result<ModelResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        match &self.script {
            Script::Responder(responder) => responder(messages, tools),
            Script::Queue(queue) => {
                let mut queue = queue
                    .lock()
                    .map_err(|_| AgentError::Generic("script lock poisoned".to_string()))?;
                match queue.len() {
                    0 => Err(AgentError::ModelApiError("script is empty".to_string())),
                    1 => Ok(queue[0].clone()),
                    _ => queue
                        .pop_front()
                        .ok_or_else(|| AgentError::ModelApiError("script is empty".to_string())),
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
