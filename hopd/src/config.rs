//! hopd configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::LlmError;
use crate::sandbox::Capability;

/// Main hopd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Agent identity used for ingress auth and answer submission
    pub identity: IdentityConfig,

    /// Decision oracle (LLM provider) configuration
    pub oracle: OracleConfig,

    /// Per-task bounds and supervisor settings
    pub task: TaskConfig,

    /// Execution sandbox settings
    pub sandbox: SandboxConfig,

    /// Page render and download settings
    pub fetch: FetchConfig,

    /// HTTP ingress settings
    pub ingress: IngressConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables are set and bounds are sane.
    /// Call this early in startup so a bad deployment fails before serving.
    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Config::validate: called");
        self.identity.resolve()?;
        self.oracle.api_key()?;

        if self.task.step_budget == 0 {
            return Err(eyre::eyre!("task.step-budget must be at least 1"));
        }
        if self.task.timeout_secs == 0 {
            return Err(eyre::eyre!("task.timeout-secs must be at least 1"));
        }
        if self.task.max_concurrent == 0 {
            return Err(eyre::eyre!("task.max-concurrent must be at least 1"));
        }
        if self.task.retained_jobs == 0 {
            return Err(eyre::eyre!("task.retained-jobs must be at least 1"));
        }
        if self.oracle.termination_token.trim().is_empty() {
            return Err(eyre::eyre!("oracle.termination-token must not be empty"));
        }
        if let Some(command) = &self.fetch.render_command
            && command.is_empty()
        {
            return Err(eyre::eyre!("fetch.render-command must name a program"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./hopd.yml
        let local_config = PathBuf::from("hopd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/hopd/hopd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("hopd").join("hopd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed here; the full `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Where the agent identity comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Environment variable holding the agent's email identity
    #[serde(rename = "email-env")]
    pub email_env: String,

    /// Environment variable holding the shared secret
    #[serde(rename = "secret-env")]
    pub secret_env: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            email_env: "HOPD_EMAIL".to_string(),
            secret_env: "HOPD_SECRET".to_string(),
        }
    }
}

impl IdentityConfig {
    /// Read the identity from the environment
    pub fn resolve(&self) -> Result<Identity> {
        let email = read_env(&self.email_env)?;
        let secret = read_env(&self.secret_env)?;
        Ok(Identity { email, secret })
    }
}

fn read_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(eyre::eyre!("Required setting missing. Set the {} environment variable.", name)),
    }
}

/// Resolved agent identity
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub secret: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Decision oracle (LLM provider) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Provider name (currently only "openai"-compatible endpoints)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// API base URL, including any version prefix
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Last word of a plain response that ends the task
    #[serde(rename = "termination-token")]
    pub termination_token: String,

    /// Consecutive failed decisions tolerated before the task fails
    pub retries: u32,

    /// Pause between failed decisions, in milliseconds
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Optional system prompt template overriding the embedded one
    #[serde(rename = "system-prompt-path")]
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            max_tokens: 8192,
            timeout_ms: 120_000,
            termination_token: "END".to_string(),
            retries: 3,
            retry_delay_ms: 1000,
            system_prompt_path: None,
        }
    }
}

impl OracleConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String, LlmError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(self.api_key_env.clone()))
    }
}

/// Per-task bounds and supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum Decide/Act/Observe cycles per task
    #[serde(rename = "step-budget")]
    pub step_budget: u32,

    /// Hard wall-clock limit per task, enforced by killing the worker
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Maximum worker processes alive at once
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Finished jobs kept for status queries; the oldest are evicted first
    #[serde(rename = "retained-jobs")]
    pub retained_jobs: usize,

    /// Directory for JSONL dumps of finished task histories
    #[serde(rename = "history-dir")]
    pub history_dir: Option<PathBuf>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            step_budget: 50,
            timeout_secs: 180,
            max_concurrent: 8,
            retained_jobs: 1000,
            history_dir: None,
        }
    }
}

/// Execution sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Captured output is truncated past this many characters
    #[serde(rename = "max-output-chars")]
    pub max_output_chars: usize,

    /// Timeout for each HTTP call a fragment makes
    #[serde(rename = "http-timeout-ms")]
    pub http_timeout_ms: u64,

    /// Capabilities bound into the sandbox; can only narrow the built-in set
    pub capabilities: Vec<Capability>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_output_chars: 20_000,
            http_timeout_ms: 30_000,
            capabilities: Capability::ALL.to_vec(),
        }
    }
}

/// Page render and download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Timeout for a render or download, in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Largest body accepted from a render or download
    #[serde(rename = "max-body-bytes")]
    pub max_body_bytes: usize,

    /// Headless browser command; the URL is appended as the last argument
    #[serde(rename = "render-command")]
    pub render_command: Option<Vec<String>>,

    /// User agent sent with plain HTTP requests
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_body_bytes: 10 * 1024 * 1024,
            render_command: None,
            user_agent: format!("hopd/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP ingress settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}
