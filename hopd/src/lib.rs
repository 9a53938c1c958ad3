//! hopd - pointer-following task daemon
//!
//! Accepts a starting locator, then lets an LLM decision oracle drive a
//! bounded tool loop (render pages, download files, run sandboxed scripts)
//! until it declares the chain finished. Every task runs in its own worker
//! process under a hard wall-clock deadline.

pub mod cli;
pub mod config;
pub mod domain;
pub mod ingress;
pub mod llm;
#[path = "loop/mod.rs"]
pub mod r#loop;
pub mod oracle;
pub mod sandbox;
pub mod supervisor;
pub mod tools;

pub use config::Config;
pub use domain::{TaskInstance, TaskStatus, ToolInvocation, Turn};
pub use supervisor::{Supervisor, WorkerReport};
