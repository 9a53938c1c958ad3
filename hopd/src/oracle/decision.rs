//! Decision - the parsed outcome of one oracle call

use tracing::debug;

use super::OracleError;
use crate::domain::{ToolInvocation, Turn};
use crate::llm::CompletionResponse;

/// What the oracle wants the loop to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Invoke one or more tools
    ToolRequest {
        content: Option<String>,
        invocations: Vec<ToolInvocation>,
    },

    /// Plain text that is not a termination; the loop keeps going
    PlainContinuation { content: String },

    /// Plain text ending in the termination token
    Termination { content: String },
}

impl Decision {
    /// Parse a completion into a Decision
    ///
    /// Tool calls without an id get `{id_prefix}_{index}`. A response with no
    /// text and no tool calls, or a tool call with no name, is malformed.
    pub fn parse(response: CompletionResponse, termination_token: &str, id_prefix: &str) -> Result<Self, OracleError> {
        debug!(
            tool_call_count = %response.tool_calls.len(),
            has_content = %response.content.is_some(),
            "Decision::parse: called"
        );
        let content = response.content.filter(|c| !c.trim().is_empty());

        if !response.tool_calls.is_empty() {
            let mut invocations = Vec::with_capacity(response.tool_calls.len());
            for (index, call) in response.tool_calls.into_iter().enumerate() {
                if call.name.trim().is_empty() {
                    return Err(OracleError::Malformed(format!("tool call {} has no name", index)));
                }
                let id = if call.id.trim().is_empty() {
                    format!("{}_{}", id_prefix, index)
                } else {
                    call.id
                };
                invocations.push(ToolInvocation::new(id, call.name, call.input));
            }
            return Ok(Decision::ToolRequest { content, invocations });
        }

        match content {
            Some(text) if is_termination(&text, termination_token) => Ok(Decision::Termination { content: text }),
            Some(text) => Ok(Decision::PlainContinuation { content: text }),
            None => Err(OracleError::Malformed("response had neither text nor tool calls".to_string())),
        }
    }

    /// The oracle turn that records this decision in the history
    pub fn to_turn(&self) -> Turn {
        match self {
            Decision::ToolRequest { content, invocations } => Turn::oracle(content.clone(), invocations.clone()),
            Decision::PlainContinuation { content } | Decision::Termination { content } => {
                Turn::oracle(Some(content.clone()), Vec::new())
            }
        }
    }
}

/// True when the last word of `text` is the termination token
///
/// Punctuation around the word is ignored and the match is case-insensitive,
/// so "Done. END." terminates but "APPEND" or "END of task 1, moving on" do not.
pub fn is_termination(text: &str, token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    text.split_whitespace()
        .next_back()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .is_some_and(|word| word.eq_ignore_ascii_case(token))
}
