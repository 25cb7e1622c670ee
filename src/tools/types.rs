//! Tool execution types and structures
//!
//! Core types for tool calls issued by the model: results fed back into
//! the conversation, advertised schemas and per-session statistics.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Result of one tool call, fed back to the model as a tool message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the tool call this answers
    pub call_id: String,

    /// Tool name that was executed
    pub tool: String,

    /// Tool output, or the error text when `is_error` is set
    pub content: String,

    /// Whether execution failed
    pub is_error: bool,

    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// Create successful result
    pub fn success(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        content: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            content: content.into(),
            is_error: false,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create failed result
    pub fn failure(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            content: error.into(),
            is_error: true,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Tool schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Parameter schema (JSON Schema)
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    /// Create new tool schema
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Function-calling entry for a chat completions request
    pub fn to_openai(&self) -> serde_json::Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Tool execution statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStats {
    /// Total executions
    pub total_executions: u64,

    /// Successful executions
    pub successful_executions: u64,

    /// Failed executions
    pub failed_executions: u64,

    /// Total execution time (ms)
    pub total_duration_ms: u64,
}

impl ToolStats {
    /// Record successful execution
    pub fn record_success(&mut self, duration_ms: u64) {
        self.total_executions += 1;
        self.successful_executions += 1;
        self.total_duration_ms += duration_ms;
    }

    /// Record failed execution
    pub fn record_failure(&mut self, duration_ms: u64) {
        self.total_executions += 1;
        self.failed_executions += 1;
        self.total_duration_ms += duration_ms;
    }

    /// Record a finished result of either kind
    pub fn record(&mut self, result: &ToolResult) {
        if result.is_error {
            self.record_failure(result.duration_ms);
        } else {
            self.record_success(result.duration_ms);
        }
    }

    /// Calculate average duration
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_executions as f64
        }
    }

    /// Calculate success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("call_1", "get_locals", "x = 1", Duration::from_millis(100));

        assert!(!result.is_error);
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.tool, "get_locals");
        assert_eq!(result.content, "x = 1");
        assert_eq!(result.duration_ms, 100);
    }

    #[test]
    fn test_tool_result_failure() {
        let result = ToolResult::failure("call_2", "get_debug_value", "debugger not started", Duration::from_millis(50));

        assert!(result.is_error);
        assert_eq!(result.content, "debugger not started");
        assert_eq!(result.duration_ms, 50);
    }

    #[test]
    fn test_tool_stats_tracking() {
        let mut stats = ToolStats::default();

        stats.record_success(100);
        stats.record_success(200);
        stats.record(&ToolResult::failure("c", "t", "e", Duration::from_millis(150)));

        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.average_duration_ms(), 150.0);
        assert!((stats.success_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_openai_function_entry() {
        let schema = ToolSchema::new(
            "get_locals",
            "Snapshot of local variables",
            json!({"type": "object", "properties": {}}),
        );

        let entry = schema.to_openai();
        assert_eq!(entry["type"], "function");
        assert_eq!(entry["function"]["name"], "get_locals");
        assert_eq!(entry["function"]["parameters"]["type"], "object");
    }
}
