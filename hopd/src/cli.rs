//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hopd - pointer-following task daemon
#[derive(Parser)]
#[command(
    name = "hopd",
    about = "Follows a chain of task pages with an LLM tool loop under a hard deadline",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP ingress and supervise submitted jobs
    Serve,

    /// Run one task under a local supervisor and wait for its outcome
    Run {
        /// Starting task locator
        url: String,
    },

    /// Internal: run one task loop in this process (used by the supervisor)
    #[command(hide = true)]
    Worker {
        /// Starting task locator
        url: String,
    },
}

impl Command {
    /// Workers keep stdout for their report line
    pub fn logs_to_stderr(&self) -> bool {
        matches!(self, Command::Worker { .. } | Command::Run { .. })
    }
}
