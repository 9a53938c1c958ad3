//! The Tool trait and its result type

use async_trait::async_trait;
use serde_json::Value;

use super::context::ToolContext;
use crate::llm::ToolDefinition;

/// Something the oracle can ask the loop to do
///
/// `execute` never fails: problems come back as an error-tagged result the
/// oracle can read and react to.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the oracle calls the tool by
    fn name(&self) -> &'static str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;

    /// How the tool is advertised to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Text handed back to the oracle, flagged when it describes a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}
