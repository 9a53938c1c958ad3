//! JobLedger - observable state of every submitted job

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::domain::TaskStatus;

/// Identifier handed back by `Supervisor::submit`
pub type JobId = Uuid;

/// Final record of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            steps: None,
            detail: None,
            finished_at: Utc::now(),
        }
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(steps) = self.steps {
            write!(f, " after {} steps", steps)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Where a job is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    Finished(JobOutcome),
}

impl JobState {
    pub fn outcome(&self) -> Option<&JobOutcome> {
        match self {
            JobState::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// One watch channel per job
///
/// Finished states are never overwritten. At most `retained` finished jobs
/// are kept; queued and running jobs are never evicted.
pub struct JobLedger {
    jobs: Mutex<HashMap<JobId, watch::Sender<JobState>>>,
    retained: usize,
}

impl JobLedger {
    pub fn new(retained: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            retained,
        }
    }

    pub fn insert(&self, id: JobId) {
        debug!(job_id = %id, "JobLedger::insert: called");
        let (tx, _rx) = watch::channel(JobState::Queued);
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(id, tx);
        }
    }

    pub fn update(&self, id: JobId, state: JobState) {
        debug!(job_id = %id, ?state, "JobLedger::update: called");
        let Ok(mut jobs) = self.jobs.lock() else {
            return;
        };
        let finishing = matches!(state, JobState::Finished(_));
        let changed = jobs.get(&id).is_some_and(|tx| {
            tx.send_if_modified(|current| {
                if matches!(current, JobState::Finished(_)) {
                    return false;
                }
                *current = state;
                true
            })
        });
        if finishing && changed {
            evict_finished(&mut jobs, self.retained);
        }
    }

    pub fn status(&self, id: JobId) -> Option<JobState> {
        let jobs = self.jobs.lock().ok()?;
        jobs.get(&id).map(|tx| tx.borrow().clone())
    }

    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<JobState>> {
        let jobs = self.jobs.lock().ok()?;
        jobs.get(&id).map(|tx| tx.subscribe())
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop the oldest finished jobs until at most `retained` remain
fn evict_finished(jobs: &mut HashMap<JobId, watch::Sender<JobState>>, retained: usize) {
    let mut finished: Vec<(DateTime<Utc>, JobId)> = jobs
        .iter()
        .filter_map(|(id, tx)| tx.borrow().outcome().map(|o| (o.finished_at, *id)))
        .collect();
    if finished.len() <= retained {
        return;
    }

    finished.sort();
    let excess = finished.len() - retained;
    for (_, id) in finished.into_iter().take(excess) {
        debug!(job_id = %id, "evict_finished: dropping job");
        jobs.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_is_sticky() {
        let ledger = JobLedger::new(16);
        let id = Uuid::now_v7();
        ledger.insert(id);
        assert_eq!(ledger.status(id), Some(JobState::Queued));

        ledger.update(id, JobState::Finished(JobOutcome::new(TaskStatus::TimedOut)));
        ledger.update(id, JobState::Running { pid: Some(1) });
        assert_eq!(ledger.status(id).unwrap().outcome().unwrap().status, TaskStatus::TimedOut);
    }

    #[test]
    fn test_oldest_finished_jobs_are_evicted() {
        let ledger = JobLedger::new(2);
        let ids: Vec<JobId> = (0..4).map(|_| Uuid::now_v7()).collect();
        for id in &ids {
            ledger.insert(*id);
        }

        for (n, id) in ids.iter().take(3).enumerate() {
            let mut outcome = JobOutcome::new(TaskStatus::Completed);
            outcome.finished_at += chrono::Duration::seconds(n as i64);
            ledger.update(*id, JobState::Finished(outcome));
        }

        assert!(ledger.status(ids[0]).is_none(), "oldest finished job kept");
        assert!(ledger.status(ids[1]).is_some());
        assert!(ledger.status(ids[2]).is_some());
        assert_eq!(ledger.status(ids[3]), Some(JobState::Queued));
        assert_eq!(ledger.len(), 3);
    }

    #[tokio::test]
    async fn test_waiter_sees_outcome_of_evicted_job() {
        let ledger = JobLedger::new(0);
        let id = Uuid::now_v7();
        ledger.insert(id);
        let mut rx = ledger.subscribe(id).unwrap();

        ledger.update(id, JobState::Finished(JobOutcome::new(TaskStatus::TimedOut)));
        assert!(ledger.is_empty());

        let state = rx.wait_for(|s| matches!(s, JobState::Finished(_))).await.unwrap();
        assert_eq!(state.outcome().unwrap().status, TaskStatus::TimedOut);
    }

    #[test]
    fn test_unknown_job() {
        let ledger = JobLedger::new(16);
        assert!(ledger.status(Uuid::now_v7()).is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_outcome_display() {
        let outcome = JobOutcome::new(TaskStatus::Failed).with_steps(3).with_detail("exit status: 1");
        assert_eq!(outcome.to_string(), "failed after 3 steps (exit status: 1)");
    }

    #[test]
    fn test_state_serializes_tagged() {
        let json = serde_json::to_value(JobState::Running { pid: Some(42) }).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["pid"], 42);
    }
}
