//! get_rendered_html tool - page content after client-side evaluation

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::download::{read_limited, validate_url};
use crate::config::FetchConfig;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// Produces the rendered HTML of a page
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, ToolError>;
}

/// Build the renderer the config asks for
///
/// A configured render command means a headless browser; otherwise pages are
/// fetched as-is over HTTP.
pub fn renderer_from_config(config: &FetchConfig) -> Result<Arc<dyn PageRenderer>, ToolError> {
    match &config.render_command {
        Some(command) => Ok(Arc::new(CommandRenderer::from_config(command, config)?)),
        None => Ok(Arc::new(HttpRenderer::from_config(config)?)),
    }
}

/// Fetches the raw HTML without running scripts
pub struct HttpRenderer {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpRenderer {
    pub fn from_config(config: &FetchConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str) -> Result<String, ToolError> {
        debug!(%url, "HttpRenderer::render: called");
        validate_url(url)?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = read_limited(response, self.max_body_bytes).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Runs an external headless browser that prints the rendered DOM
///
/// The URL is appended as the final argument, e.g.
/// `chromium --headless --dump-dom <url>`. The browser runs in the worker's
/// process group, so a supervisor kill takes it down too.
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl CommandRenderer {
    pub fn from_config(command: &[String], config: &FetchConfig) -> Result<Self, ToolError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ToolError::RenderCommand("render command is empty".to_string()))?;
        debug!(%program, ?args, "CommandRenderer::from_config: called");
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render(&self, url: &str) -> Result<String, ToolError> {
        debug!(%url, program = %self.program, "CommandRenderer::render: called");
        validate_url(url)?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::RenderCommand(format!("failed to start {}: {}", self.program, e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(%url, "CommandRenderer::render: timed out");
                return Err(ToolError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::RenderCommand(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if output.stdout.len() > self.max_body_bytes {
            return Err(ToolError::TooLarge {
                limit: self.max_body_bytes,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Return the rendered HTML (or Markdown) of a page
pub struct RenderHtmlTool {
    renderer: Arc<dyn PageRenderer>,
}

impl RenderHtmlTool {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Tool for RenderHtmlTool {
    fn name(&self) -> &'static str {
        "get_rendered_html"
    }

    fn description(&self) -> &'static str {
        "Fetch a web page after its JavaScript has run and return the resulting HTML. Use format=markdown for a shorter text rendering."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL of the page"
                },
                "format": {
                    "type": "string",
                    "enum": ["html", "markdown"],
                    "description": "Output format (default: html)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(task_id = %ctx.task_id, step = %ctx.step, "RenderHtmlTool::execute: called");
        let Some(url) = input["url"].as_str() else {
            return ToolResult::error("url must be a string");
        };

        let markdown = match input.get("format").and_then(Value::as_str) {
            None | Some("html") => false,
            Some("markdown") => true,
            Some(other) => return ToolResult::error(format!("format must be html or markdown, got '{}'", other)),
        };

        match self.renderer.render(url).await {
            Ok(html) if markdown => ToolResult::success(html2md::rewrite_html(&html, false)),
            Ok(html) => ToolResult::success(html),
            Err(e) => {
                debug!(%url, error = %e, "RenderHtmlTool::execute: render failed");
                ToolResult::error(format!("Error rendering HTML for {}: {}", url, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct StaticRenderer(&'static str);

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render(&self, _url: &str) -> Result<String, ToolError> {
            Ok(self.0.to_string())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Uuid::now_v7(), 1)
    }

    #[tokio::test]
    async fn test_render_html() {
        let tool = RenderHtmlTool::new(Arc::new(StaticRenderer("<h1>Q1</h1>")));
        let result = tool.execute(serde_json::json!({"url": "http://x/q1"}), &ctx()).await;
        assert!(!result.is_error);
        assert_eq!(result.content, "<h1>Q1</h1>");
    }

    #[tokio::test]
    async fn test_render_markdown() {
        let tool = RenderHtmlTool::new(Arc::new(StaticRenderer("<h1>Title</h1><p>Body text</p>")));
        let result = tool
            .execute(serde_json::json!({"url": "http://x/q1", "format": "markdown"}), &ctx())
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("Title"));
        assert!(!result.content.contains("<h1>"));
    }

    #[tokio::test]
    async fn test_render_rejects_unknown_format() {
        let tool = RenderHtmlTool::new(Arc::new(StaticRenderer("")));
        let result = tool
            .execute(serde_json::json!({"url": "http://x/q1", "format": "pdf"}), &ctx())
            .await;
        assert!(result.is_error);
    }

    #[test]
    fn test_renderer_from_config_rejects_empty_command() {
        let config = FetchConfig {
            render_command: Some(vec![]),
            ..FetchConfig::default()
        };
        assert!(renderer_from_config(&config).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_renderer_appends_url() {
        let command = vec!["echo".to_string(), "rendered".to_string()];
        let renderer = CommandRenderer::from_config(&command, &FetchConfig::default()).unwrap();
        let html = renderer.render("https://example.test/page").await.unwrap();
        assert_eq!(html.trim(), "rendered https://example.test/page");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_renderer_reports_failure() {
        let command = vec!["false".to_string()];
        let renderer = CommandRenderer::from_config(&command, &FetchConfig::default()).unwrap();
        let err = renderer.render("https://example.test/page").await.unwrap_err();
        assert!(matches!(err, ToolError::RenderCommand(_)));
    }
}
