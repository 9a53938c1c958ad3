//! Shared test doubles for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use hopd::domain::{ToolInvocation, Turn};
use hopd::llm::{LlmError, ToolDefinition};
use hopd::r#loop::LoopConfig;
use hopd::oracle::{Decision, Oracle, OracleError};
use hopd::tools::builtin::Downloader;
use hopd::tools::{Tool, ToolContext, ToolError, ToolResult};

/// What a scripted oracle should do on one call
pub enum Step {
    Decide(Decision),
    Fail(OracleError),
}

/// Oracle that replays a script and records every history it was shown
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Decision>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always(decision: Decision) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(decision),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().expect("seen lock").len()
    }

    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn decide(&self, turns: &[Turn], _tools: &[ToolDefinition]) -> Result<Decision, OracleError> {
        self.seen.lock().expect("seen lock").push(turns.to_vec());
        let next = self.script.lock().expect("script lock").pop_front();
        match next {
            Some(Step::Decide(decision)) => Ok(decision),
            Some(Step::Fail(error)) => Err(error),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| OracleError::Malformed("script exhausted".to_string())),
        }
    }
}

pub fn transport_failure() -> OracleError {
    OracleError::Transport(LlmError::Status {
        status: 503,
        body: "upstream unavailable".to_string(),
    })
}

pub fn request(id: &str, name: &str, arguments: Value) -> Decision {
    Decision::ToolRequest {
        content: None,
        invocations: vec![ToolInvocation::new(id, name, arguments)],
    }
}

pub fn end() -> Decision {
    Decision::Termination {
        content: "All done. END".to_string(),
    }
}

pub fn loop_config(step_budget: u32) -> LoopConfig {
    LoopConfig {
        step_budget,
        oracle_retries: 3,
        retry_delay: Duration::from_millis(1),
    }
}

/// Downloader serving fixed bytes for every URL
pub struct StubDownloader {
    pub body: Vec<u8>,
    pub requested: Mutex<Vec<String>>,
}

impl StubDownloader {
    pub fn new(body: impl Into<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            body: body.into(),
            requested: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Downloader for StubDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, ToolError> {
        self.requested.lock().expect("requested lock").push(url.to_string());
        Ok(self.body.clone())
    }
}

/// Tool that never finishes on its own
pub struct StallTool;

#[async_trait]
impl Tool for StallTool {
    fn name(&self) -> &'static str {
        "stall"
    }

    fn description(&self) -> &str {
        "Blocks far longer than any deadline"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> ToolResult {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        ToolResult::success("unreachable")
    }
}
