//! TaskInstance - one run of the task loop and its append-only history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::Turn;

/// Lifecycle status of a task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    TimedOut,
    StepLimitExceeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::TimedOut => "timed_out",
            TaskStatus::StepLimitExceeded => "step_limit_exceeded",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Errors from mutating a task instance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task {id} already finished with status {status}")]
    Finished { id: Uuid, status: TaskStatus },

    #[error("Status {0} is not terminal")]
    NotTerminal(TaskStatus),
}

/// One task's execution record
///
/// The history only grows, and once a terminal status is set the instance
/// refuses every further mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    id: Uuid,
    locator: String,
    turns: Vec<Turn>,
    steps: u32,
    status: TaskStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskInstance {
    /// Create a running instance seeded with the initiator turn
    pub fn new(locator: impl Into<String>) -> Self {
        let locator = locator.into();
        let id = Uuid::now_v7();
        debug!(%id, %locator, "TaskInstance::new: called");
        Self {
            id,
            turns: vec![Turn::initiator(locator.clone())],
            locator,
            steps: 0,
            status: TaskStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn ensure_running(&self) -> Result<(), TaskError> {
        if self.status.is_terminal() {
            return Err(TaskError::Finished {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Append a turn to the history
    pub fn push(&mut self, turn: Turn) -> Result<(), TaskError> {
        self.ensure_running()?;
        self.turns.push(turn);
        Ok(())
    }

    /// Append a batch of turns, all or nothing
    pub fn extend(&mut self, turns: Vec<Turn>) -> Result<(), TaskError> {
        self.ensure_running()?;
        self.turns.extend(turns);
        Ok(())
    }

    /// Count one Observing transition; returns the new step count
    pub fn record_step(&mut self) -> Result<u32, TaskError> {
        self.ensure_running()?;
        self.steps += 1;
        Ok(self.steps)
    }

    /// Move to a terminal status
    pub fn finish(&mut self, status: TaskStatus) -> Result<(), TaskError> {
        self.ensure_running()?;
        if !status.is_terminal() {
            return Err(TaskError::NotTerminal(status));
        }
        debug!(id = %self.id, %status, steps = %self.steps, "TaskInstance::finish: called");
        self.status = status;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
