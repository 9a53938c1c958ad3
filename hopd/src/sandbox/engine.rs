//! Sandbox - runs one script fragment against a fixed capability set

use rhai::module_resolvers::DummyModuleResolver;
use rhai::packages::{Package, StandardPackage};
use rhai::{Dynamic, Engine};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::capabilities::{self, Bindings, CapabilitySet, Scratch};
use super::output::OutputBuffer;
use crate::config::SandboxConfig;

// Engine size limits; these bound memory, not time
const MAX_STRING_SIZE: usize = 16 * 1024 * 1024;
const MAX_ARRAY_SIZE: usize = 1_000_000;
const MAX_MAP_SIZE: usize = 100_000;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_FN_EXPR_DEPTH: usize = 32;
const MAX_CALL_LEVELS: usize = 64;

/// Sandbox limits
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub max_output_chars: usize,
    pub http_timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_output_chars: 20_000,
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Captured output of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub text: String,
    /// Parse error, uncaught throw or host panic; `text` then starts with `Error:`
    pub faulted: bool,
}

impl RunOutput {
    fn clean(text: String) -> Self {
        Self { text, faulted: false }
    }

    fn fault(text: String) -> Self {
        Self { text, faulted: true }
    }
}

/// Capability-restricted script runner
///
/// One instance belongs to one worker. The capability set is fixed at
/// construction; scratch state persists across runs of the same instance.
pub struct Sandbox {
    capabilities: CapabilitySet,
    limits: SandboxLimits,
    http: reqwest::Client,
    scratch: Scratch,
}

impl Sandbox {
    pub fn new(capabilities: CapabilitySet, limits: SandboxLimits) -> Self {
        debug!(?capabilities, ?limits, "Sandbox::new: called");
        let http = reqwest::Client::builder()
            .timeout(limits.http_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Sandbox::new: falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            capabilities,
            limits,
            http,
            scratch: Arc::new(Mutex::new(Default::default())),
        }
    }

    /// Build from config, narrowing the built-in capability set
    pub fn from_config(config: &SandboxConfig) -> Self {
        let capabilities = CapabilitySet::full().narrowed(&config.capabilities);
        let limits = SandboxLimits {
            max_output_chars: config.max_output_chars,
            http_timeout: Duration::from_millis(config.http_timeout_ms),
        };
        Self::new(capabilities, limits)
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Run a fragment on the blocking pool and return its captured output
    ///
    /// Never fails: every fault comes back as a flagged output whose text
    /// starts with `Error:`.
    pub async fn run(&self, code: &str) -> RunOutput {
        debug!(code_len = %code.len(), "Sandbox::run: called");
        let bindings = self.bindings(Handle::try_current().ok());
        let capabilities = self.capabilities.clone();
        let max_output_chars = self.limits.max_output_chars;
        let code = code.to_string();

        let joined = tokio::task::spawn_blocking(move || execute(&code, &capabilities, &bindings, max_output_chars)).await;

        match joined {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Sandbox::run: blocking task did not complete");
                RunOutput::fault(format!("Error: sandbox task aborted: {}", e))
            }
        }
    }

    fn bindings(&self, runtime: Option<Handle>) -> Bindings {
        Bindings {
            http: self.http.clone(),
            runtime,
            scratch: self.scratch.clone(),
        }
    }
}

/// Build an engine that can reach only the given capabilities
fn build_engine(capabilities: &CapabilitySet, bindings: &Bindings, output: Arc<Mutex<OutputBuffer>>) -> Engine {
    let mut engine = Engine::new_raw();

    engine.register_global_module(StandardPackage::new().as_shared_module());
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");

    engine.set_max_string_size(MAX_STRING_SIZE);
    engine.set_max_array_size(MAX_ARRAY_SIZE);
    engine.set_max_map_size(MAX_MAP_SIZE);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);
    engine.set_max_call_levels(MAX_CALL_LEVELS);

    let print_sink = output.clone();
    engine.on_print(move |s| {
        if let Ok(mut buffer) = print_sink.lock() {
            buffer.push_line(s);
        }
    });

    let debug_sink = output;
    engine.on_debug(move |s, _source, pos| {
        if let Ok(mut buffer) = debug_sink.lock() {
            buffer.push_line(&format!("[debug {}] {}", pos, s));
        }
    });

    capabilities::register(&mut engine, capabilities, bindings);
    engine
}

fn execute(code: &str, capabilities: &CapabilitySet, bindings: &Bindings, max_output_chars: usize) -> RunOutput {
    let output = Arc::new(Mutex::new(OutputBuffer::new(max_output_chars)));
    let engine = build_engine(capabilities, bindings, output.clone());

    let outcome = catch_unwind(AssertUnwindSafe(|| engine.eval::<Dynamic>(code)));

    let captured = output
        .lock()
        .map(|b| b.clone())
        .unwrap_or_else(|_| OutputBuffer::new(max_output_chars));

    match outcome {
        Ok(Ok(value)) => {
            let mut captured = captured;
            if !value.is_unit() {
                captured.push_line(&value.to_string());
            }
            RunOutput::clean(captured.render())
        }
        Ok(Err(e)) => {
            debug!(error = %e, "execute: script fault");
            RunOutput::fault(render_fault(&e.to_string(), &captured, max_output_chars))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(%message, "execute: host panic inside sandbox");
            RunOutput::fault(render_fault(
                &format!("host function panicked: {}", message),
                &captured,
                max_output_chars,
            ))
        }
    }
}

fn render_fault(error: &str, captured: &OutputBuffer, max_output_chars: usize) -> String {
    let mut rendered = OutputBuffer::new(max_output_chars.max(error.len() + 7));
    rendered.push_line(&format!("Error: {}", error));
    if !captured.is_empty() {
        rendered.push_line("Output before the error:");
        rendered.push(&captured.render());
    }
    rendered.render()
}
