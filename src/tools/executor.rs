//! Concurrent executor for model-issued tool calls
//!
//! A batch of calls from one assistant turn runs concurrently. Every call
//! produces a `ToolResult`; failures (unknown tool, bad arguments, backend
//! errors) become error results instead of aborting the batch.

use crate::errors::Result;
use crate::tools::registry::ToolRegistry;
use crate::tools::types::{ToolResult, ToolStats};
use crate::types::ToolCall;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Backend that actually runs project tools
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call_tool(&self, name: &str, args: &serde_json::Value) -> Result<String>;
}

/// Executor bound to one handler and the subset of tools an agent may use
pub struct ToolExecutor {
    registry: ToolRegistry,
    allowed: Vec<String>,
    handler: Arc<dyn ToolHandler>,
    stats: Mutex<ToolStats>,
}

impl ToolExecutor {
    /// Create executor exposing only `allowed` tools
    pub fn new(handler: Arc<dyn ToolHandler>, allowed: &[&str]) -> Self {
        Self {
            registry: ToolRegistry::new(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            handler,
            stats: Mutex::new(ToolStats::default()),
        }
    }

    /// Schemas advertised to the model
    pub fn schemas(&self) -> Vec<crate::tools::types::ToolSchema> {
        let names: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        self.registry.select(&names)
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Execute one call; never fails
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();

        if !self.registry.contains(&call.name) || !self.allowed.iter().any(|t| t == &call.name) {
            return self.finish(ToolResult::failure(
                &call.id,
                &call.name,
                format!("Unknown tool: {}", call.name),
                start.elapsed(),
            ));
        }

        let args: serde_json::Value = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(v) => v,
                Err(e) => {
                    return self.finish(ToolResult::failure(
                        &call.id,
                        &call.name,
                        format!("Invalid arguments for {}: {}", call.name, e),
                        start.elapsed(),
                    ))
                }
            }
        };

        debug!(tool = %call.name, args = %call.arguments, "executing tool call");
        let result = match self.handler.call_tool(&call.name, &args).await {
            Ok(content) => ToolResult::success(&call.id, &call.name, content, start.elapsed()),
            Err(e) => ToolResult::failure(&call.id, &call.name, e.to_string(), start.elapsed()),
        };
        self.finish(result)
    }

    /// Execute a whole batch concurrently, results in call order
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }

    fn finish(&self, result: ToolResult) -> ToolResult {
        if let Ok(mut stats) = self.stats.lock() {
            stats.record(&result);
        }
        result
    }

    /// Snapshot of execution statistics
    pub fn stats(&self) -> ToolStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}
