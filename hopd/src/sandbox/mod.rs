//! Execution sandbox for model-authored script fragments
//!
//! Fragments are Rhai scripts run by an engine that starts empty and is given
//! only the pure standard package plus an explicit set of host capabilities.
//! Output is captured and bounded, and faults are returned as text.

mod capabilities;
mod engine;
mod error;
mod output;

pub use capabilities::{Capability, CapabilitySet, parse_csv, pdf_text};
pub use engine::{RunOutput, Sandbox, SandboxLimits};
pub use error::SandboxError;
pub use output::{NO_OUTPUT, OutputBuffer};
