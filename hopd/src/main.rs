//! hopd - pointer-following task daemon
//!
//! CLI entry point for the ingress server, one-shot runs and the worker process.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use hopd::cli::{Cli, Command};
use hopd::config::Config;
use hopd::domain::TaskStatus;
use hopd::ingress::{self, IngressState};
use hopd::supervisor::{ProcessLauncher, Supervisor, SupervisorConfig, run_worker};

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_stderr: bool) -> Result<()> {
    // Priority: CLI --log-level > config file > INFO
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hopd")
            .join("logs");
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(log_dir.join("hopd.log")).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn build_supervisor(cli: &Cli, config: &Config) -> Result<Supervisor> {
    let launcher = ProcessLauncher::current_exe(cli.config.as_ref(), cli.log_level.as_deref())
        .context("Failed to locate worker executable")?;
    Ok(Supervisor::new(Arc::new(launcher), SupervisorConfig::from(&config.task)))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(
        cli.log_level.as_deref(),
        config_log_level.as_deref(),
        cli.command.logs_to_stderr(),
    )
    .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match &cli.command {
        Command::Serve => cmd_serve(&cli, &config).await,
        Command::Run { url } => cmd_run(&cli, &config, url).await,
        Command::Worker { url } => cmd_worker(&config, url).await,
    }
}

async fn cmd_serve(cli: &Cli, config: &Config) -> Result<()> {
    let identity = config.identity.resolve()?;
    let supervisor = build_supervisor(cli, config)?;
    info!(
        bind = %config.ingress.bind,
        port = config.ingress.port,
        timeout_secs = config.task.timeout_secs,
        max_concurrent = config.task.max_concurrent,
        "hopd serve starting"
    );
    ingress::serve(&config.ingress, IngressState::new(supervisor, identity.secret)).await
}

async fn cmd_run(cli: &Cli, config: &Config, url: &str) -> Result<()> {
    let supervisor = build_supervisor(cli, config)?;
    let job_id = supervisor.submit(url);
    let outcome = supervisor
        .wait(job_id)
        .await
        .ok_or_else(|| eyre::eyre!("Job {} vanished", job_id))?;

    println!("{}: {}", job_id, outcome);
    if outcome.status != TaskStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_worker(config: &Config, url: &str) -> Result<()> {
    let report = run_worker(config, url).await?;
    info!(task_id = %report.task_id, status = %report.status, steps = report.steps, "Worker finished");
    println!("{}", report.to_line()?);
    Ok(())
}
