//! History dump - persists a finished task's turns to a JSONL file
//!
//! Files are written to `{history_dir}/{task-id}.jsonl`: one header line with
//! the task summary, then one line per turn in history order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{TaskInstance, TaskStatus, Turn};

#[derive(Serialize)]
struct HistoryHeader<'a> {
    task_id: Uuid,
    locator: &'a str,
    status: TaskStatus,
    steps: u32,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct HistoryLine<'a> {
    seq: usize,
    #[serde(flatten)]
    turn: &'a Turn,
}

/// Write a task's history, returning the file path
pub fn write_history(dir: impl AsRef<Path>, task: &TaskInstance) -> eyre::Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let path = dir.join(format!("{}.jsonl", task.id()));
    debug!(?path, turns = %task.turns().len(), "write_history: called");

    let mut writer = BufWriter::new(File::create(&path)?);
    let header = HistoryHeader {
        task_id: task.id(),
        locator: task.locator(),
        status: task.status(),
        steps: task.steps(),
        started_at: task.started_at(),
        finished_at: task.finished_at(),
    };
    writeln!(writer, "{}", serde_json::to_string(&header)?)?;

    for (seq, turn) in task.turns().iter().enumerate() {
        writeln!(writer, "{}", serde_json::to_string(&HistoryLine { seq, turn })?)?;
    }
    writer.flush()?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_history() {
        let temp = tempdir().unwrap();
        let mut task = TaskInstance::new("http://x/q1");
        task.push(Turn::oracle(Some("END".to_string()), vec![])).unwrap();
        task.record_step().unwrap();
        task.finish(TaskStatus::Completed).unwrap();

        let path = write_history(temp.path().join("history"), &task).unwrap();
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<serde_json::Value> = content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["status"], "completed");
        assert_eq!(lines[0]["steps"], 1);
        assert_eq!(lines[1]["role"], "initiator");
        assert_eq!(lines[2]["seq"], 1);
        assert_eq!(lines[2]["content"], "END");
    }
}
