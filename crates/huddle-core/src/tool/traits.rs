//! Tool trait definition
//!
//! A tool is the external capability a leaf specialist invokes to fetch
//! the data it answers from (a stats endpoint, a search API, ...).

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::ToolDefinition;
use crate::Result;

/// Tool execution result
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Output string from tool execution
    pub output: String,
    /// Whether the execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// Tool capability invoked by leaf specialists
///
/// Implementations must return (or fail) within a bounded time; callers
/// treat both `Err` and an `is_error` result as a tool failure.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name (referenced from domain definitions)
    fn name(&self) -> &str;

    /// Get the tool description (shown to the classifier when filling arguments)
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's input parameters
    fn input_schema(&self) -> JsonValue;

    /// Execute the tool with the given input
    async fn execute(&self, input: JsonValue) -> Result<ToolResult>;

    /// Definition handed to the classifier
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}
