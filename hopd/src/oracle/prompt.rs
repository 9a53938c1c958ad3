//! System prompt template
//!
//! The default template is embedded from `prompts/system.pmt`; a file named by
//! `oracle.system-prompt-path` replaces it. Templates use Handlebars syntax.

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Embedded default system prompt
pub const SYSTEM_TEMPLATE: &str = include_str!("../../prompts/system.pmt");

/// Values available to the system prompt template
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub email: String,
    pub secret: String,
    pub termination_token: String,
}

/// Loads and renders the system prompt
pub struct SystemPrompt {
    hbs: Handlebars<'static>,
    template: String,
}

impl SystemPrompt {
    /// Use the embedded template
    pub fn embedded() -> Self {
        debug!("SystemPrompt::embedded: called");
        Self::from_template(SYSTEM_TEMPLATE.to_string())
    }

    /// Load from a file, or the embedded template when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::embedded());
        };
        let template = std::fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read system prompt {}: {}", path.display(), e))?;
        info!("Loaded system prompt from {}", path.display());
        Ok(Self::from_template(template))
    }

    fn from_template(template: String) -> Self {
        let mut hbs = Handlebars::new();
        // Prompts are plain text; HTML escaping would mangle secrets and URLs
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.set_strict_mode(true);
        Self { hbs, template }
    }

    pub fn render(&self, context: &PromptContext) -> Result<String> {
        debug!("SystemPrompt::render: called");
        self.hbs
            .render_template(&self.template, context)
            .map_err(|e| eyre!("Failed to render system prompt: {}", e))
    }
}
