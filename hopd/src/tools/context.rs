//! ToolContext - per-dispatch context handed to tools

use tracing::debug;
use uuid::Uuid;

/// Execution context for tools - scoped to one task
///
/// Carries identity for logging only; tools hold no per-task state of their
/// own beyond what they were built with.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Task this dispatch belongs to
    pub task_id: Uuid,

    /// Step the dispatch happens in (1-based, the step being acted on)
    pub step: u32,
}

impl ToolContext {
    pub fn new(task_id: Uuid, step: u32) -> Self {
        debug!(%task_id, %step, "ToolContext::new: called");
        Self { task_id, step }
    }
}
