//! Tool error types

use thiserror::Error;

/// Errors that can occur inside tool handlers and their collaborators
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing required argument '{name}'")]
    MissingArgument { name: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Response larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Render command failed: {0}")]
    RenderCommand(String),

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message() {
        let err = ToolError::HttpStatus {
            status: 404,
            url: "https://example.test/q2".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("https://example.test/q2"));
    }

    #[test]
    fn test_missing_argument_message() {
        let err = ToolError::MissingArgument {
            name: "url".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required argument 'url'");
    }
}
