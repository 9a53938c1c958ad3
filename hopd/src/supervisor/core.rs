//! Supervisor - runs each job in its own worker process under a deadline

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{JobId, JobLedger, JobOutcome, JobState, WorkerLauncher, WorkerReport};
use crate::config::TaskConfig;
use crate::domain::TaskStatus;

/// Supervisor limits
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Hard wall-clock limit per worker
    pub timeout: Duration,

    /// Maximum workers alive at once
    pub max_concurrent: usize,

    /// Finished jobs kept in the ledger
    pub retained_jobs: usize,
}

impl From<&TaskConfig> for SupervisorConfig {
    fn from(config: &TaskConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_concurrent: config.max_concurrent,
            retained_jobs: config.retained_jobs,
        }
    }
}

/// Accepts jobs and runs each one in an isolated worker process
///
/// Cheap to clone; clones share the ledger and the concurrency limit.
#[derive(Clone)]
pub struct Supervisor {
    launcher: Arc<dyn WorkerLauncher>,
    ledger: Arc<JobLedger>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, config: SupervisorConfig) -> Self {
        debug!(?config, "Supervisor::new: called");
        Self {
            launcher,
            ledger: Arc::new(JobLedger::new(config.retained_jobs)),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: config.timeout,
        }
    }

    /// Accept a job and return immediately
    ///
    /// Must be called inside a tokio runtime.
    pub fn submit(&self, locator: impl Into<String>) -> JobId {
        let locator = locator.into();
        let id = Uuid::now_v7();
        info!(job_id = %id, %locator, "Job accepted");
        self.ledger.insert(id);

        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.run_job(id, &locator).await;
            match outcome.status {
                TaskStatus::Completed => info!(job_id = %id, %outcome, "Job finished"),
                TaskStatus::Failed => error!(job_id = %id, %outcome, "Job failed"),
                _ => warn!(job_id = %id, %outcome, "Job stopped"),
            }
            this.ledger.update(id, JobState::Finished(outcome));
        });

        id
    }

    pub fn status(&self, id: JobId) -> Option<JobState> {
        self.ledger.status(id)
    }

    /// Number of jobs accepted so far
    pub fn job_count(&self) -> usize {
        self.ledger.len()
    }

    /// Wait for a job to finish; None if the id is unknown
    pub async fn wait(&self, id: JobId) -> Option<JobOutcome> {
        let mut rx = self.ledger.subscribe(id)?;
        let state = rx.wait_for(|s| matches!(s, JobState::Finished(_))).await.ok()?;
        state.outcome().cloned()
    }

    async fn run_job(&self, id: JobId, locator: &str) -> JobOutcome {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return JobOutcome::new(TaskStatus::Failed).with_detail(format!("supervisor closed: {}", e)),
        };

        let mut child = match self.launcher.launch(locator) {
            Ok(child) => child,
            Err(e) => {
                error!(job_id = %id, error = %e, "Worker launch failed");
                return JobOutcome::new(TaskStatus::Failed).with_detail(e.to_string());
            }
        };

        let pid = child.id();
        info!(job_id = %id, ?pid, "Worker launched");
        self.ledger.update(id, JobState::Running { pid });

        // Drain stdout while waiting so a chatty worker cannot block on a full pipe
        let stdout = child.stdout.take();
        let mut reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stdout) = stdout
                && let Err(e) = stdout.read_to_end(&mut buf).await
            {
                debug!(error = %e, "run_job: stdout read failed");
            }
            buf
        });

        // One deadline covers the exit and the end of stdout; a leftover
        // process holding the pipe counts against the job
        let deadline = Instant::now() + self.timeout;
        let finished = tokio::time::timeout_at(deadline, async {
            let exit = child.wait().await;
            let stdout = (&mut reader).await.unwrap_or_default();
            (exit, stdout)
        })
        .await;

        let outcome = match finished {
            Ok((Ok(exit), stdout)) => match WorkerReport::from_stdout(&stdout) {
                Ok(report) => {
                    debug!(job_id = %id, task_id = %report.task_id, "run_job: report received");
                    JobOutcome::new(report.status).with_steps(report.steps)
                }
                Err(e) => JobOutcome::new(TaskStatus::Failed).with_detail(format!("{}; worker {}", e, exit)),
            },
            Ok((Err(e), _)) => JobOutcome::new(TaskStatus::Failed).with_detail(format!("waiting on worker failed: {}", e)),
            Err(_) => {
                warn!(job_id = %id, ?pid, timeout = ?self.timeout, "Worker timed out, killing");
                reclaim(&mut child, pid).await;
                JobOutcome::new(TaskStatus::TimedOut).with_detail(format!("killed after {:?}", self.timeout))
            }
        };

        // Whatever the worker left behind in its group goes with it
        kill_group(pid);
        reader.abort();
        outcome
    }
}

/// Kill a worker and everything in its process group, then reap it
///
/// `pid` is the worker's pid from launch; `child.id()` is gone once the
/// worker has been reaped, but its group may still have members.
pub async fn reclaim(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);

    if let Err(e) = child.start_kill() {
        // Already dead is the common case after killpg
        debug!(error = %e, "reclaim: start_kill");
    }

    match child.wait().await {
        Ok(status) => debug!(%status, "reclaim: worker reaped"),
        Err(e) => warn!(error = %e, "reclaim: wait failed"),
    }
}

/// SIGKILL the process group led by `pid`; ESRCH just means it is empty
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Some(pid) = pid
        && let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL)
    {
        debug!(%pid, error = %e, "kill_group: killpg");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
