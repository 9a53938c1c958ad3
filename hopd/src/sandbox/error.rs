//! Capability failures surfaced into scripts

use rhai::{EvalAltResult, Position};
use thiserror::Error;

/// Errors raised by host capabilities while a fragment runs
///
/// These never escape the sandbox: they become script runtime errors and
/// end up in the rendered `Error:` text.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("no async runtime available for network capabilities")]
    NoRuntime,

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("value conversion failed: {0}")]
    Convert(String),
}

impl From<SandboxError> for Box<EvalAltResult> {
    fn from(err: SandboxError) -> Self {
        Box::new(EvalAltResult::ErrorRuntime(err.to_string().into(), Position::NONE))
    }
}
