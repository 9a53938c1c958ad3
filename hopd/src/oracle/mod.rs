//! Decision oracle adapter
//!
//! Turns the task history into a model request and the model's reply into a
//! typed `Decision`. Nothing past this boundary inspects raw responses.

mod adapter;
mod decision;
mod prompt;

use std::time::Duration;
use thiserror::Error;

use crate::llm::LlmError;

pub use adapter::{LlmOracle, Oracle, build_messages};
pub use decision::{Decision, is_termination};
pub use prompt::{PromptContext, SYSTEM_TEMPLATE, SystemPrompt};

/// A failed Decide attempt
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle transport failed: {0}")]
    Transport(#[from] LlmError),

    #[error("oracle response malformed: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Server-suggested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OracleError::Transport(e) => e.retry_after(),
            OracleError::Malformed(_) => None,
        }
    }

    /// True when retrying cannot help
    pub fn is_fatal(&self) -> bool {
        match self {
            OracleError::Transport(e) => e.is_fatal(),
            OracleError::Malformed(_) => false,
        }
    }
}
