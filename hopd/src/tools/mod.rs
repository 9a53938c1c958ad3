//! Tool system for hopd
//!
//! A fixed registry of tools the oracle can invoke: page rendering, file
//! download and sandboxed script execution.

pub mod builtin;
mod context;
mod error;
mod registry;
mod traits;

pub use context::ToolContext;
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolResult};
