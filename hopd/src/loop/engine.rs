//! TaskLoop - the Decide/Act/Observe state machine for one task
//!
//! The loop owns the task's history. It calls the oracle with the full
//! history, dispatches any requested tools, appends their results in request
//! order and counts one step per Observing transition. It has no notion of
//! wall-clock time; the supervisor kills the worker when the deadline passes.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::LoopConfig;
use crate::domain::{TaskInstance, TaskStatus, ToolInvocation, Turn};
use crate::llm::ToolDefinition;
use crate::oracle::{Decision, Oracle};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

/// Where the loop is in its cycle
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Deciding,
    Acting(Vec<ToolInvocation>),
    Observing {
        results: Vec<(ToolInvocation, ToolResult)>,
        terminate: bool,
    },
    Done(TaskStatus),
}

impl LoopState {
    pub fn is_done(&self) -> bool {
        matches!(self, LoopState::Done(_))
    }
}

/// Runs one task instance to a terminal status
pub struct TaskLoop {
    config: LoopConfig,
    oracle: Arc<dyn Oracle>,
    tools: Arc<ToolRegistry>,
    definitions: Vec<ToolDefinition>,
    task: TaskInstance,
    state: LoopState,
    consecutive_failures: u32,
}

impl TaskLoop {
    pub fn new(locator: impl Into<String>, config: LoopConfig, oracle: Arc<dyn Oracle>, tools: Arc<ToolRegistry>) -> Self {
        let task = TaskInstance::new(locator);
        debug!(task_id = %task.id(), step_budget = %config.step_budget, "TaskLoop::new: called");
        let definitions = tools.definitions();
        Self {
            config,
            oracle,
            tools,
            definitions,
            task,
            state: LoopState::Deciding,
            consecutive_failures: 0,
        }
    }

    pub fn task(&self) -> &TaskInstance {
        &self.task
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Run until a terminal status and hand back the finished instance
    pub async fn run(mut self) -> TaskInstance {
        info!(task_id = %self.task.id(), locator = %self.task.locator(), "Task loop started");
        while !self.state.is_done() {
            self.advance().await;
        }
        info!(
            task_id = %self.task.id(),
            status = %self.task.status(),
            steps = %self.task.steps(),
            turns = %self.task.turns().len(),
            "Task loop finished"
        );
        self.task
    }

    /// Perform exactly one state transition
    pub async fn advance(&mut self) -> &LoopState {
        let state = std::mem::replace(&mut self.state, LoopState::Deciding);
        self.state = match state {
            LoopState::Deciding => self.decide().await,
            LoopState::Acting(invocations) => self.act(invocations).await,
            LoopState::Observing { results, terminate } => self.observe(results, terminate),
            LoopState::Done(status) => LoopState::Done(status),
        };

        if let LoopState::Done(status) = self.state
            && !self.task.status().is_terminal()
            && let Err(e) = self.task.finish(status)
        {
            warn!(task_id = %self.task.id(), error = %e, "advance: could not finish task");
        }
        &self.state
    }

    async fn decide(&mut self) -> LoopState {
        let step = self.task.steps() + 1;
        debug!(task_id = %self.task.id(), %step, "decide: called");

        match self.oracle.decide(self.task.turns(), &self.definitions).await {
            Ok(decision) => {
                self.consecutive_failures = 0;
                let turn = decision.to_turn();
                if let Err(e) = self.task.push(turn) {
                    warn!(task_id = %self.task.id(), error = %e, "decide: history closed");
                    return LoopState::Done(TaskStatus::Failed);
                }
                match decision {
                    Decision::ToolRequest { invocations, .. } => {
                        debug!(task_id = %self.task.id(), %step, count = %invocations.len(), "decide: tool request");
                        LoopState::Acting(invocations)
                    }
                    Decision::PlainContinuation { .. } => {
                        debug!(task_id = %self.task.id(), %step, "decide: plain continuation");
                        LoopState::Observing {
                            results: Vec::new(),
                            terminate: false,
                        }
                    }
                    Decision::Termination { .. } => {
                        debug!(task_id = %self.task.id(), %step, "decide: termination");
                        LoopState::Observing {
                            results: Vec::new(),
                            terminate: true,
                        }
                    }
                }
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    task_id = %self.task.id(),
                    %step,
                    failures = %self.consecutive_failures,
                    error = %e,
                    "Oracle call failed"
                );
                if let Err(push_err) = self.task.push(Turn::oracle_error(e.to_string())) {
                    warn!(task_id = %self.task.id(), error = %push_err, "decide: history closed");
                    return LoopState::Done(TaskStatus::Failed);
                }

                if e.is_fatal() || self.consecutive_failures > self.config.oracle_retries {
                    warn!(task_id = %self.task.id(), "Oracle retries exhausted");
                    return LoopState::Done(TaskStatus::Failed);
                }

                let delay = e.retry_after().unwrap_or(self.config.retry_delay);
                if !delay.is_zero() {
                    debug!(?delay, "decide: waiting before retry");
                    tokio::time::sleep(delay).await;
                }
                LoopState::Deciding
            }
        }
    }

    async fn act(&mut self, invocations: Vec<ToolInvocation>) -> LoopState {
        let ctx = ToolContext::new(self.task.id(), self.task.steps() + 1);
        debug!(task_id = %self.task.id(), step = %ctx.step, count = %invocations.len(), "act: called");

        let results = self.tools.dispatch_all(&invocations, &ctx).await;
        for (invocation, result) in invocations.iter().zip(&results) {
            debug!(
                task_id = %self.task.id(),
                tool_name = %invocation.name,
                is_error = %result.is_error,
                len = %result.content.len(),
                "act: tool finished"
            );
        }

        LoopState::Observing {
            results: invocations.into_iter().zip(results).collect(),
            terminate: false,
        }
    }

    fn observe(&mut self, results: Vec<(ToolInvocation, ToolResult)>, terminate: bool) -> LoopState {
        let turns = results
            .into_iter()
            .map(|(invocation, result)| Turn::tool_result(&invocation, result.content, result.is_error))
            .collect();

        let step = match self.task.extend(turns).and_then(|_| self.task.record_step()) {
            Ok(step) => step,
            Err(e) => {
                warn!(task_id = %self.task.id(), error = %e, "observe: history closed");
                return LoopState::Done(TaskStatus::Failed);
            }
        };
        debug!(task_id = %self.task.id(), %step, %terminate, "observe: step recorded");

        if terminate {
            LoopState::Done(TaskStatus::Completed)
        } else if step >= self.config.step_budget {
            info!(task_id = %self.task.id(), %step, "Step budget exhausted");
            LoopState::Done(TaskStatus::StepLimitExceeded)
        } else {
            LoopState::Deciding
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Oracle that replays scripted decisions
    struct ScriptedOracle {
        script: Mutex<Vec<Result<Decision, String>>>,
        fallback: Option<Decision>,
    }

    impl ScriptedOracle {
        fn new(mut script: Vec<Result<Decision, String>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                fallback: None,
            }
        }

        fn always(decision: Decision) -> Self {
            Self {
                script: Mutex::new(Vec::new()),
                fallback: Some(decision),
            }
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn decide(&self, _turns: &[Turn], _tools: &[ToolDefinition]) -> Result<Decision, OracleError> {
            let next = self.script.lock().unwrap().pop();
            match next {
                Some(Ok(decision)) => Ok(decision),
                Some(Err(message)) => Err(OracleError::Malformed(message)),
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| OracleError::Malformed("script exhausted".to_string())),
            }
        }
    }

    struct EchoTool;

    #[async_trait]
    impl crate::tools::Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::empty();
        registry.add_tool(Box::new(EchoTool));
        Arc::new(registry)
    }

    fn config(step_budget: u32) -> LoopConfig {
        LoopConfig {
            step_budget,
            oracle_retries: 3,
            retry_delay: Duration::ZERO,
        }
    }

    fn echo(id: &str) -> Decision {
        Decision::ToolRequest {
            content: None,
            invocations: vec![ToolInvocation::new(id, "echo", serde_json::json!({"n": id}))],
        }
    }

    fn end() -> Decision {
        Decision::Termination {
            content: "END".to_string(),
        }
    }

    #[tokio::test]
    async fn test_transitions_in_order() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(echo("a")), Ok(end())]));
        let mut task_loop = TaskLoop::new("http://x/q1", config(10), oracle, tools());

        assert!(matches!(task_loop.advance().await, LoopState::Acting(_)));
        assert!(matches!(task_loop.advance().await, LoopState::Observing { .. }));
        assert_eq!(task_loop.advance().await, &LoopState::Deciding);
        assert_eq!(task_loop.task().steps(), 1);
        assert!(matches!(task_loop.advance().await, LoopState::Observing { terminate: true, .. }));
        assert_eq!(task_loop.advance().await, &LoopState::Done(TaskStatus::Completed));
        assert_eq!(task_loop.task().status(), TaskStatus::Completed);
        assert_eq!(task_loop.task().steps(), 2);
    }

    #[tokio::test]
    async fn test_plain_continuation_consumes_step() {
        let thinking = Decision::PlainContinuation {
            content: "Let me think".to_string(),
        };
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(thinking), Ok(end())]));
        let task = TaskLoop::new("u", config(10), oracle, tools()).run().await;

        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.steps(), 2);
        assert_eq!(task.turns().len(), 3);
        assert!(task.turns().iter().all(|t| !t.is_error()));
    }

    #[tokio::test]
    async fn test_step_budget() {
        let oracle = Arc::new(ScriptedOracle::always(echo("x")));
        let task = TaskLoop::new("u", config(3), oracle, tools()).run().await;

        assert_eq!(task.status(), TaskStatus::StepLimitExceeded);
        assert_eq!(task.steps(), 3);
        // initiator + 3 x (oracle, tool result)
        assert_eq!(task.turns().len(), 7);
    }

    #[tokio::test]
    async fn test_termination_on_last_budgeted_step_completes() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(echo("a")), Ok(end())]));
        let task = TaskLoop::new("u", config(2), oracle, tools()).run().await;
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.steps(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Err("one".to_string()),
            Err("two".to_string()),
            Err("three".to_string()),
            Err("four".to_string()),
        ]));
        let task = TaskLoop::new("u", config(10), oracle, tools()).run().await;

        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.steps(), 0);
        assert_eq!(task.turns().iter().filter(|t| t.is_error()).count(), 4);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Err("one".to_string()),
            Err("two".to_string()),
            Err("three".to_string()),
            Ok(echo("a")),
            Err("four".to_string()),
            Err("five".to_string()),
            Ok(end()),
        ]));
        let task = TaskLoop::new("u", config(10), oracle, tools()).run().await;
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_finished_task_rejects_mutation() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(end())]));
        let mut task = TaskLoop::new("u", config(10), oracle, tools()).run().await;
        assert!(task.push(Turn::initiator("again")).is_err());
    }
}
