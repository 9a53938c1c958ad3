//! download_file tool - fetch raw bytes and hand them back as base64

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::FetchConfig;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// Retrieves raw bytes for a locator
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, ToolError>;
}

/// Reject anything that is not an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<(), ToolError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ToolError::InvalidArgument(format!("bad url '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ToolError::InvalidArgument(format!(
            "url scheme must be http or https, got '{}'",
            other
        ))),
    }
}

/// Read a response body, refusing to buffer more than `limit` bytes
pub async fn read_limited(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, ToolError> {
    if let Some(len) = response.content_length()
        && len as usize > limit
    {
        return Err(ToolError::TooLarge { limit });
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(ToolError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Plain HTTP GET downloader
pub struct HttpDownloader {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpDownloader {
    pub fn from_config(config: &FetchConfig) -> Result<Self, ToolError> {
        debug!(timeout_ms = %config.timeout_ms, "HttpDownloader::from_config: called");
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
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, ToolError> {
        debug!(%url, "HttpDownloader::download: called");
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
        debug!(bytes = %body.len(), "HttpDownloader::download: complete");
        Ok(body)
    }
}

/// Download a file and return its bytes base64-encoded
pub struct DownloadFileTool {
    downloader: Arc<dyn Downloader>,
}

impl DownloadFileTool {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl Tool for DownloadFileTool {
    fn name(&self) -> &'static str {
        "download_file"
    }

    fn description(&self) -> &'static str {
        "Download a file from a URL. Returns the raw bytes base64-encoded; decode them with base64_decode or pdf_text inside run_code."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL of the file"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(task_id = %ctx.task_id, step = %ctx.step, "DownloadFileTool::execute: called");
        let Some(url) = input["url"].as_str() else {
            return ToolResult::error("url must be a string");
        };

        match self.downloader.download(url).await {
            Ok(bytes) => ToolResult::success(STANDARD.encode(bytes)),
            Err(e) => {
                debug!(%url, error = %e, "DownloadFileTool::execute: download failed");
                ToolResult::error(format!("Error downloading file from {}: {}", url, e))
            }
        }
    }
}
