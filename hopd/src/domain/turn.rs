//! Turn and ToolInvocation - the entries of a task's history

use serde::{Deserialize, Serialize};

/// One tool invocation requested by the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlates the invocation with its result turn
    pub id: String,

    /// Tool name as declared in the registry
    pub name: String,

    /// JSON arguments, checked against the tool's schema at dispatch
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A single entry in a task's ordered history
///
/// Turns are immutable once appended to a TaskInstance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// The seed turn carrying the starting locator
    Initiator { content: String },

    /// One Decide step; `error` is set when the attempt failed
    Oracle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invocations: Vec<ToolInvocation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Outcome of one tool invocation
    ToolResult {
        invocation_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

impl Turn {
    pub fn initiator(content: impl Into<String>) -> Self {
        Turn::Initiator {
            content: content.into(),
        }
    }

    pub fn oracle(content: Option<String>, invocations: Vec<ToolInvocation>) -> Self {
        Turn::Oracle {
            content,
            invocations,
            error: None,
        }
    }

    /// An oracle turn recording a failed Decide attempt
    pub fn oracle_error(error: impl Into<String>) -> Self {
        Turn::Oracle {
            content: None,
            invocations: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn tool_result(invocation: &ToolInvocation, content: impl Into<String>, is_error: bool) -> Self {
        Turn::ToolResult {
            invocation_id: invocation.id.clone(),
            tool_name: invocation.name.clone(),
            content: content.into(),
            is_error,
        }
    }

    pub fn is_oracle(&self) -> bool {
        matches!(self, Turn::Oracle { .. })
    }

    pub fn is_error(&self) -> bool {
        match self {
            Turn::Oracle { error, .. } => error.is_some(),
            Turn::ToolResult { is_error, .. } => *is_error,
            Turn::Initiator { .. } => false,
        }
    }

    /// Tool invocations carried by this turn (empty unless a successful oracle turn)
    pub fn invocations(&self) -> &[ToolInvocation] {
        match self {
            Turn::Oracle { invocations, .. } => invocations,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_serializes_with_role_tag() {
        let turn = Turn::initiator("https://example.test/start");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "initiator");
        assert_eq!(json["content"], "https://example.test/start");
    }

    #[test]
    fn test_oracle_error_turn() {
        let turn = Turn::oracle_error("API error 503: down");
        assert!(turn.is_oracle());
        assert!(turn.is_error());
        assert!(turn.invocations().is_empty());

        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "oracle");
        assert!(json.get("invocations").is_none());
    }

    #[test]
    fn test_tool_result_copies_invocation_identity() {
        let inv = ToolInvocation::new("call_1", "run_code", serde_json::json!({"code": "1"}));
        let turn = Turn::tool_result(&inv, "1", false);
        match turn {
            Turn::ToolResult {
                invocation_id,
                tool_name,
                ..
            } => {
                assert_eq!(invocation_id, "call_1");
                assert_eq!(tool_name, "run_code");
            }
            _ => panic!("Expected ToolResult turn"),
        }
    }

    #[test]
    fn test_turn_deserialize() {
        let turn: Turn = serde_json::from_str(r#"{"role":"oracle","content":"END"}"#).unwrap();
        assert_eq!(turn, Turn::oracle(Some("END".to_string()), vec![]));
    }
}
