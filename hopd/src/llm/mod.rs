//! LLM client module for hopd
//!
//! Provides the stateless completion client the decision oracle talks through.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, FinishReason, Message, MessageContent, Role, TokenUsage,
    ToolCall, ToolDefinition,
};

use crate::config::OracleConfig;

/// Create an LLM client based on the provider named in config
pub fn create_client(config: &OracleConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIClient::from_config(config)?)),
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider() {
        let config = OracleConfig {
            provider: "carrier-pigeon".to_string(),
            ..OracleConfig::default()
        };
        assert!(matches!(create_client(&config), Err(LlmError::UnknownProvider(_))));
    }
}
