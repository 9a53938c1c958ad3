//! Task loop module for hopd
//!
//! One TaskLoop drives one task: Decide, Act, Observe, repeat, until the
//! oracle terminates, the step budget runs out or the oracle keeps failing.

mod config;
mod engine;
mod history;

pub use config::LoopConfig;
pub use engine::{LoopState, TaskLoop};
pub use history::write_history;
