//! WorkerReport - the single line a worker prints on stdout when it finishes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::SupervisorError;
use crate::domain::{TaskInstance, TaskStatus};

/// Outcome of one task loop, as reported by its worker process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub steps: u32,
    pub turns: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
}

impl WorkerReport {
    pub fn from_task(task: &TaskInstance, history_path: Option<PathBuf>) -> Self {
        Self {
            task_id: task.id(),
            status: task.status(),
            steps: task.steps(),
            turns: task.turns().len(),
            history_path,
        }
    }

    /// Serialize as one JSON line
    pub fn to_line(&self) -> Result<String, SupervisorError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Find the report in a worker's stdout
    ///
    /// The last non-empty line that parses wins, so stray output printed
    /// before the report is tolerated.
    pub fn from_stdout(stdout: &[u8]) -> Result<Self, SupervisorError> {
        let text = String::from_utf8_lossy(stdout);
        text.lines()
            .rev()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .find_map(|line| serde_json::from_str::<WorkerReport>(line).ok())
            .ok_or_else(|| SupervisorError::Report("worker printed no report".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_line_parses_back() {
        let mut task = TaskInstance::new("http://x/q1");
        task.record_step().unwrap();
        task.finish(TaskStatus::Completed).unwrap();

        let report = WorkerReport::from_task(&task, None);
        let line = report.to_line().unwrap();
        assert!(!line.contains('\n'));

        let stdout = format!("noise\n{}\n\n", line);
        assert_eq!(WorkerReport::from_stdout(stdout.as_bytes()).unwrap(), report);
    }

    #[test]
    fn test_missing_report() {
        assert!(WorkerReport::from_stdout(b"hello\nworld\n").is_err());
        assert!(WorkerReport::from_stdout(b"").is_err());
    }
}
