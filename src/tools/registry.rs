//! Tool registry with JSON schemas
//!
//! Maintains the project tools the model may call, with their schemas.
//!
//! Tools:
//! - run_test: Insert an assertion into the test and run it
//! - get_locals: Snapshot of locals at the paused debugger
//! - get_debug_value: Evaluate one variable or expression
//! - get_debug_values: Evaluate a comma separated list

use crate::tools::types::ToolSchema;
use serde_json::json;
use std::collections::HashMap;

pub const RUN_TEST: &str = "run_test";
pub const GET_LOCALS: &str = "get_locals";
pub const GET_DEBUG_VALUE: &str = "get_debug_value";
pub const GET_DEBUG_VALUES: &str = "get_debug_values";

const DEBUGGER_PAUSED: &str = "A startup debugger pauses at the line where the assert statement needs to be generated, ";

/// Tool registry
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    /// Map of tool name to schema
    tools: HashMap<String, ToolSchema>,
}

impl ToolRegistry {
    /// Create new tool registry with all project tools
    pub fn new() -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };

        registry.register_run_test();
        registry.register_get_locals();
        registry.register_get_debug_value();
        registry.register_get_debug_values();

        registry
    }

    fn register_run_test(&mut self) {
        let schema = ToolSchema::new(
            RUN_TEST,
            "Put the generated assert statement into the unit test and run it. \
             It may take some time, but can provide accurate running results.",
            json!({
                "type": "object",
                "properties": {
                    "assert_code": {
                        "type": "string",
                        "description": "The generated assert statement."
                    }
                },
                "required": ["assert_code"]
            }),
        );
        self.tools.insert(RUN_TEST.to_string(), schema);
    }

    fn register_get_locals(&mut self) {
        let schema = ToolSchema::new(
            GET_LOCALS,
            "Started a debugger that paused at the current line, and returned a snapshot of all current local variables.",
            json!({
                "type": "object",
                "properties": {}
            }),
        );
        self.tools.insert(GET_LOCALS.to_string(), schema);
    }

    fn register_get_debug_value(&mut self) {
        let schema = ToolSchema::new(
            GET_DEBUG_VALUE,
            format!(
                "{}and this tool can query the value of a variable or an expression within the test function at that time.",
                DEBUGGER_PAUSED
            ),
            json!({
                "type": "object",
                "properties": {
                    "var_or_expr": {
                        "type": "string",
                        "description": "The variable name or an expression."
                    }
                },
                "required": ["var_or_expr"]
            }),
        );
        self.tools.insert(GET_DEBUG_VALUE.to_string(), schema);
    }

    fn register_get_debug_values(&mut self) {
        let schema = ToolSchema::new(
            GET_DEBUG_VALUES,
            format!(
                "{}and this tool can query the values of variables or expressions only within the test function at that time.",
                DEBUGGER_PAUSED
            ),
            json!({
                "type": "object",
                "properties": {
                    "var_or_expr_list": {
                        "type": "string",
                        "description": "The list variable names or expressions seperated by comma, for example: var1, var2 ..."
                    }
                },
                "required": ["var_or_expr_list"]
            }),
        );
        self.tools.insert(GET_DEBUG_VALUES.to_string(), schema);
    }

    /// Check if tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Schemas for `names`, in the given order; unknown names are skipped
    pub fn select(&self, names: &[&str]) -> Vec<ToolSchema> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name).cloned())
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
