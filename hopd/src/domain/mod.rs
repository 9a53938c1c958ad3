//! Core data model: turns, tool invocations and task instances

mod task;
mod turn;

pub use task::{TaskError, TaskInstance, TaskStatus};
pub use turn::{ToolInvocation, Turn};
