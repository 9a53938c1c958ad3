//! Task supervisor
//!
//! Each job runs in a separate worker process (`hopd worker <url>`). The
//! supervisor races the worker's exit against a hard deadline and kills the
//! worker's whole process group when the deadline wins.

mod core;
mod launcher;
mod ledger;
mod report;
mod worker;

use thiserror::Error;

pub use self::core::{Supervisor, SupervisorConfig, reclaim};
pub use launcher::{ProcessLauncher, WorkerLauncher};
pub use ledger::{JobId, JobLedger, JobOutcome, JobState};
pub use report::WorkerReport;
pub use worker::{run_task, run_worker};

/// Errors at the supervisor/worker boundary
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to launch worker: {0}")]
    Launch(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad worker report: {0}")]
    Report(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
