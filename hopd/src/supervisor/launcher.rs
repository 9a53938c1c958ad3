//! Worker launchers - start the isolated process that runs one task loop

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

use super::SupervisorError;

/// Starts a worker process for a locator
///
/// The child's stdout must be piped; the supervisor reads the report from it.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, locator: &str) -> Result<Child, SupervisorError>;
}

/// Launches `program args... <locator>` in its own process group
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-invoke the running binary as `hopd [--config C] [--log-level L] worker <locator>`
    pub fn current_exe(config_path: Option<&PathBuf>, log_level: Option<&str>) -> Result<Self, SupervisorError> {
        let program = std::env::current_exe().map_err(SupervisorError::Launch)?;
        let mut args: Vec<OsString> = Vec::new();
        if let Some(path) = config_path {
            args.push("--config".into());
            args.push(path.clone().into_os_string());
        }
        if let Some(level) = log_level {
            args.push("--log-level".into());
            args.push(level.into());
        }
        args.push("worker".into());
        debug!(?program, ?args, "ProcessLauncher::current_exe: called");
        Ok(Self { program, args })
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, locator: &str) -> Result<Child, SupervisorError> {
        debug!(program = ?self.program, %locator, "ProcessLauncher::launch: called");
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(locator)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // New process group so a kill reaches anything the worker started
        #[cfg(unix)]
        command.process_group(0);

        command.spawn().map_err(SupervisorError::Launch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_exe_args() {
        let path = PathBuf::from("/etc/hopd.yml");
        let launcher = ProcessLauncher::current_exe(Some(&path), Some("debug")).unwrap();
        let args: Vec<String> = launcher.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--config", "/etc/hopd.yml", "--log-level", "debug", "worker"]);
    }

    #[tokio::test]
    async fn test_launch_missing_program() {
        let launcher = ProcessLauncher::new("/nonexistent/hopd-worker", Vec::<String>::new());
        assert!(matches!(launcher.launch("http://x/q1"), Err(SupervisorError::Launch(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_locator_is_last_argument() {
        use tokio::io::AsyncReadExt;

        let launcher = ProcessLauncher::new("sh", ["-c", "echo \"$1\"", "sh"]);
        let mut child = launcher.launch("http://x/q1").unwrap();
        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).await.unwrap();
        child.wait().await.unwrap();
        assert_eq!(out.trim(), "http://x/q1");
    }
}
