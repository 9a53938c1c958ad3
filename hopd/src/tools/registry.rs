//! ToolRegistry - the closed set of tools a task can invoke

use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::ToolInvocation;
use crate::llm::ToolDefinition;
use crate::sandbox::Sandbox;

use super::builtin::{DownloadFileTool, Downloader, HttpDownloader, PageRenderer, RenderHtmlTool, RunCodeTool, renderer_from_config};
use super::{Tool, ToolContext, ToolError, ToolResult};

/// Maps tool names to handlers
///
/// Built once per worker; dispatch never panics or errors past this boundary.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the three built-in tools over the given collaborators
    pub fn standard(renderer: Arc<dyn PageRenderer>, downloader: Arc<dyn Downloader>, sandbox: Arc<Sandbox>) -> Self {
        debug!("ToolRegistry::standard: called");
        let mut registry = Self::empty();
        registry.add_tool(Box::new(RenderHtmlTool::new(renderer)));
        registry.add_tool(Box::new(DownloadFileTool::new(downloader)));
        registry.add_tool(Box::new(RunCodeTool::new(sandbox)));
        registry
    }

    /// Build the standard registry from configuration
    pub fn from_config(config: &Config) -> Result<Self, ToolError> {
        debug!("ToolRegistry::from_config: called");
        let renderer = renderer_from_config(&config.fetch)?;
        let downloader = Arc::new(HttpDownloader::from_config(&config.fetch)?);
        let sandbox = Arc::new(Sandbox::from_config(&config.sandbox));
        let registry = Self::standard(renderer, downloader, sandbox);
        debug!(tools = ?registry.tool_names(), "ToolRegistry::from_config: built");
        Ok(registry)
    }

    /// Create an empty registry (for testing)
    pub fn empty() -> Self {
        debug!("ToolRegistry::empty: called");
        Self { tools: HashMap::new() }
    }

    /// Add a tool, replacing any tool with the same name
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolRegistry::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool definitions for the oracle, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| t.definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch one invocation
    pub async fn dispatch(&self, invocation: &ToolInvocation, ctx: &ToolContext) -> ToolResult {
        debug!(
            task_id = %ctx.task_id,
            tool_name = %invocation.name,
            tool_id = %invocation.id,
            "ToolRegistry::dispatch: called"
        );
        let Some(tool) = self.tools.get(&invocation.name) else {
            debug!("ToolRegistry::dispatch: unknown tool");
            return ToolResult::error(
                ToolError::UnknownTool {
                    name: invocation.name.clone(),
                }
                .to_string(),
            );
        };

        if let Err(e) = check_arguments(&tool.input_schema(), &invocation.arguments) {
            debug!(error = %e, "ToolRegistry::dispatch: arguments rejected");
            return ToolResult::error(e.to_string());
        }

        match AssertUnwindSafe(tool.execute(invocation.arguments.clone(), ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(tool_name = %invocation.name, "ToolRegistry::dispatch: tool panicked");
                ToolResult::error(format!("Tool '{}' crashed while handling the request", invocation.name))
            }
        }
    }

    /// Dispatch every invocation concurrently; results keep request order
    pub async fn dispatch_all(&self, invocations: &[ToolInvocation], ctx: &ToolContext) -> Vec<ToolResult> {
        debug!(count = %invocations.len(), "ToolRegistry::dispatch_all: called");
        join_all(invocations.iter().map(|inv| self.dispatch(inv, ctx))).await
    }
}

/// Check arguments against the schema's `required` list
fn check_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    let required = schema.get("required").and_then(Value::as_array);
    let Some(object) = arguments.as_object() else {
        if required.is_some_and(|r| !r.is_empty()) || schema.get("type").and_then(Value::as_str) == Some("object") {
            return Err(ToolError::InvalidArgument("arguments must be a JSON object".to_string()));
        }
        return Ok(());
    };

    for name in required.into_iter().flatten().filter_map(Value::as_str) {
        if object.get(name).is_none_or(Value::is_null) {
            return Err(ToolError::MissingArgument { name: name.to_string() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use uuid::Uuid;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}, "delay_ms": {"type": "integer"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
            if let Some(ms) = input["delay_ms"].as_u64() {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            ToolResult::success(input["text"].as_str().unwrap_or_default())
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &'static str {
            "panic"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> ToolResult {
            panic!("handler bug");
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::empty();
        registry.add_tool(Box::new(EchoTool));
        registry.add_tool(Box::new(PanicTool));
        registry
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Uuid::now_v7(), 1)
    }

    #[test]
    fn test_from_config_has_builtin_tools() {
        let registry = ToolRegistry::from_config(&Config::default()).unwrap();
        assert_eq!(registry.tool_names(), vec!["download_file", "get_rendered_html", "run_code"]);
        let defs = registry.definitions();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].name, "download_file");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let inv = ToolInvocation::new("call_1", "rm_rf", serde_json::json!({}));
        let result = registry().dispatch(&inv, &ctx()).await;
        assert!(result.is_error);
        assert!(result.content.contains("Tool not found: rm_rf"));
    }

    #[tokio::test]
    async fn test_dispatch_missing_required_argument() {
        let inv = ToolInvocation::new("call_1", "echo", serde_json::json!({"other": 1}));
        let result = registry().dispatch(&inv, &ctx()).await;
        assert!(result.is_error);
        assert!(result.content.contains("'text'"));

        let inv = ToolInvocation::new("call_2", "echo", serde_json::json!("text"));
        assert!(registry().dispatch(&inv, &ctx()).await.is_error);
    }

    #[tokio::test]
    async fn test_dispatch_panic_becomes_error() {
        let inv = ToolInvocation::new("call_1", "panic", serde_json::json!({}));
        let result = registry().dispatch(&inv, &ctx()).await;
        assert!(result.is_error);
        assert!(result.content.contains("crashed"));
    }

    #[tokio::test]
    async fn test_dispatch_all_keeps_request_order() {
        let invocations = vec![
            ToolInvocation::new("a", "echo", serde_json::json!({"text": "slow", "delay_ms": 50})),
            ToolInvocation::new("b", "missing", serde_json::json!({})),
            ToolInvocation::new("c", "echo", serde_json::json!({"text": "fast"})),
        ];

        let results = registry().dispatch_all(&invocations, &ctx()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ToolResult::success("slow"));
        assert!(results[1].is_error);
        assert_eq!(results[2], ToolResult::success("fast"));
    }
}
