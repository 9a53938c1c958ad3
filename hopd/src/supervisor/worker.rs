//! Worker entry point - builds every collaborator fresh and runs one task loop

use eyre::{Context, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use super::WorkerReport;
use crate::config::Config;
use crate::r#loop::{LoopConfig, TaskLoop, write_history};
use crate::oracle::{LlmOracle, Oracle};
use crate::tools::ToolRegistry;

/// Run one task in this process and return its report
///
/// Nothing here is shared with other workers: the oracle client, tool
/// registry, sandbox and HTTP pools are all created for this task alone.
pub async fn run_worker(config: &Config, locator: &str) -> Result<WorkerReport> {
    debug!(%locator, "run_worker: called");
    let identity = config.identity.resolve()?;
    let oracle: Arc<dyn Oracle> =
        Arc::new(LlmOracle::from_config(&config.oracle, &identity).context("Failed to build oracle")?);
    let tools = Arc::new(ToolRegistry::from_config(config).context("Failed to build tool registry")?);

    run_task(config, locator, oracle, tools).await
}

/// Run one task with the given oracle and tools
pub async fn run_task(
    config: &Config,
    locator: &str,
    oracle: Arc<dyn Oracle>,
    tools: Arc<ToolRegistry>,
) -> Result<WorkerReport> {
    let task = TaskLoop::new(locator, LoopConfig::from(config), oracle, tools).run().await;

    let history_path = match &config.task.history_dir {
        Some(dir) => match write_history(dir, &task) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(task_id = %task.id(), error = %e, "Failed to write task history");
                None
            }
        },
        None => None,
    };

    Ok(WorkerReport::from_task(&task, history_path))
}
