//! run_code tool - evaluate a script fragment in the sandbox

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::sandbox::{Capability, Sandbox};
use crate::tools::{Tool, ToolContext, ToolResult};

/// Run a Rhai fragment with the worker's sandbox
pub struct RunCodeTool {
    sandbox: Arc<Sandbox>,
    description: String,
}

impl RunCodeTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        let description = describe(&sandbox);
        Self { sandbox, description }
    }
}

fn describe(sandbox: &Sandbox) -> String {
    let mut text = String::from(
        "Run a Rhai script and return everything it printed plus its final value. \
         Faults come back as text starting with 'Error:'. Available host functions:",
    );
    let capabilities: Vec<Capability> = sandbox.capabilities().iter().collect();
    if capabilities.is_empty() {
        text.push_str(" none.");
    }
    for capability in capabilities {
        text.push_str(&format!(" {} ({});", capability.functions().join(", "), capability));
    }
    text
}

#[async_trait]
impl Tool for RunCodeTool {
    fn name(&self) -> &'static str {
        "run_code"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Rhai source to evaluate"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(task_id = %ctx.task_id, step = %ctx.step, "RunCodeTool::execute: called");
        let Some(code) = input["code"].as_str() else {
            return ToolResult::error("code must be a string");
        };

        let output = self.sandbox.run(code).await;
        ToolResult {
            is_error: output.faulted,
            content: output.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{CapabilitySet, SandboxLimits};
    use uuid::Uuid;

    fn tool(capabilities: CapabilitySet) -> RunCodeTool {
        RunCodeTool::new(Arc::new(Sandbox::new(capabilities, SandboxLimits::default())))
    }

    #[tokio::test]
    async fn test_run_code_success() {
        let result = tool(CapabilitySet::full())
            .execute(serde_json::json!({"code": "print(1 + 1);"}), &ToolContext::new(Uuid::now_v7(), 1))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "2");
    }

    #[tokio::test]
    async fn test_run_code_fault_is_tagged() {
        let result = tool(CapabilitySet::full())
            .execute(serde_json::json!({"code": "throw \"bad\";"}), &ToolContext::new(Uuid::now_v7(), 1))
            .await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_run_code_printing_error_text_succeeds() {
        let result = tool(CapabilitySet::full())
            .execute(
                serde_json::json!({"code": r#"print("Error: 404 is the answer");"#}),
                &ToolContext::new(Uuid::now_v7(), 1),
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "Error: 404 is the answer");
    }

    #[test]
    fn test_description_lists_enabled_functions() {
        let described = tool(CapabilitySet::full().narrowed(&[Capability::Csv])).description;
        assert!(described.contains("parse_csv"));
        assert!(!described.contains("http_get"));
    }
}
