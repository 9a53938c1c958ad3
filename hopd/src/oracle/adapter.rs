//! Oracle trait and the LLM-backed adapter

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::prompt::{PromptContext, SystemPrompt};
use super::{Decision, OracleError};
use crate::config::{Identity, OracleConfig};
use crate::domain::Turn;
use crate::llm::{self, CompletionRequest, ContentBlock, LlmClient, Message, Role, ToolDefinition};

/// Nudge sent when the history ends on the oracle's own plain text
const CONTINUE_NUDGE: &str = "Continue.";

/// Maps an ordered turn history to the next decision
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn decide(&self, turns: &[Turn], tools: &[ToolDefinition]) -> Result<Decision, OracleError>;
}

/// Oracle backed by a chat completions model
pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    system_prompt: String,
    max_tokens: u32,
    termination_token: String,
}

impl LlmOracle {
    pub fn new(
        client: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        max_tokens: u32,
        termination_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            max_tokens,
            termination_token: termination_token.into(),
        }
    }

    /// Build the client and render the system prompt from configuration
    pub fn from_config(config: &OracleConfig, identity: &Identity) -> eyre::Result<Self> {
        debug!(model = %config.model, "LlmOracle::from_config: called");
        let client = llm::create_client(config)?;
        let system_prompt = SystemPrompt::load(config.system_prompt_path.as_deref())?.render(&PromptContext {
            email: identity.email.clone(),
            secret: identity.secret.clone(),
            termination_token: config.termination_token.clone(),
        })?;
        info!(model = %config.model, "Oracle ready");
        Ok(Self::new(client, system_prompt, config.max_tokens, config.termination_token.clone()))
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn decide(&self, turns: &[Turn], tools: &[ToolDefinition]) -> Result<Decision, OracleError> {
        debug!(turn_count = %turns.len(), "LlmOracle::decide: called");
        let request = CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            messages: build_messages(turns),
            tools: tools.to_vec(),
            max_tokens: self.max_tokens,
        };

        let response = self.client.complete(request).await?;
        debug!(
            prompt_tokens = %response.usage.prompt_tokens,
            completion_tokens = %response.usage.completion_tokens,
            finish = ?response.finish,
            "LlmOracle::decide: response received"
        );
        if response.finish.is_truncated() {
            warn!(max_tokens = %self.max_tokens, "Oracle response hit the token limit");
        }

        Decision::parse(response, &self.termination_token, &format!("call_{}", turns.len()))
    }
}

/// Translate the turn history into chat messages
///
/// Consecutive tool-result turns are grouped into one message. Failed oracle
/// attempts become user notes so the model can see what went wrong.
pub fn build_messages(turns: &[Turn]) -> Vec<Message> {
    debug!(turn_count = %turns.len(), "build_messages: called");
    let mut messages = Vec::with_capacity(turns.len() + 1);
    let mut pending_results: Vec<ContentBlock> = Vec::new();

    for turn in turns {
        if !matches!(turn, Turn::ToolResult { .. }) && !pending_results.is_empty() {
            messages.push(Message::blocks(Role::User, std::mem::take(&mut pending_results)));
        }

        match turn {
            Turn::Initiator { content } => messages.push(Message::text(Role::User, format!("Start with the task at: {}", content))),
            Turn::Oracle {
                error: Some(error), ..
            } => {
                messages.push(Message::text(Role::User, format!(
                    "[system note] Your previous response could not be used: {}",
                    error
                )));
            }
            Turn::Oracle {
                content, invocations, ..
            } if !invocations.is_empty() => {
                let mut blocks = Vec::with_capacity(invocations.len() + 1);
                if let Some(text) = content {
                    blocks.push(ContentBlock::text(text.clone()));
                }
                blocks.extend(invocations.iter().map(|inv| ContentBlock::ToolUse {
                    id: inv.id.clone(),
                    name: inv.name.clone(),
                    input: inv.arguments.clone(),
                }));
                messages.push(Message::blocks(Role::Assistant, blocks));
            }
            // Every plain reply gets a nudge, not only the latest one
            Turn::Oracle { content, .. } => {
                messages.push(Message::text(Role::Assistant, content.clone().unwrap_or_default()));
                messages.push(Message::text(Role::User, CONTINUE_NUDGE));
            }
            Turn::ToolResult {
                invocation_id,
                content,
                is_error,
                ..
            } => pending_results.push(ContentBlock::tool_result(invocation_id.clone(), content.clone(), *is_error)),
        }
    }

    if !pending_results.is_empty() {
        messages.push(Message::blocks(Role::User, pending_results));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolInvocation;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, MessageContent, Role, ToolCall};

    fn history() -> Vec<Turn> {
        let a = ToolInvocation::new("call_a", "get_rendered_html", serde_json::json!({"url": "http://x/q1"}));
        let b = ToolInvocation::new("call_b", "download_file", serde_json::json!({"url": "http://x/d.csv"}));
        vec![
            Turn::initiator("http://x/q1"),
            Turn::oracle(None, vec![a.clone(), b.clone()]),
            Turn::tool_result(&a, "<html/>", false),
            Turn::tool_result(&b, "YSxi", false),
        ]
    }

    #[test]
    fn test_build_messages_groups_results() {
        let messages = build_messages(&history());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        match &messages[2].content {
            MessageContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            MessageContent::Text(_) => panic!("Expected tool result blocks"),
        }
    }

    #[test]
    fn test_build_messages_nudges_after_plain_text() {
        let turns = vec![
            Turn::initiator("http://x/q1"),
            Turn::oracle(Some("Thinking about it".to_string()), vec![]),
        ];
        let messages = build_messages(&turns);
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[2].content, MessageContent::Text(t) if t == CONTINUE_NUDGE));
    }

    #[test]
    fn test_earlier_plain_reply_keeps_its_nudge() {
        let first = vec![
            Turn::initiator("http://x/q1"),
            Turn::oracle(Some("Let me look again".to_string()), vec![]),
        ];
        let mut later = first.clone();
        later.push(Turn::oracle(Some("Still thinking".to_string()), vec![]));

        let before = build_messages(&first);
        let after = build_messages(&later);
        assert_eq!(after.len(), 5);
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.role, b.role);
        }
        let roles: Vec<Role> = after.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
    }

    #[test]
    fn test_build_messages_error_turn_is_user_note() {
        let turns = vec![Turn::initiator("http://x/q1"), Turn::oracle_error("API error 503")];
        let messages = build_messages(&turns);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::User);
        assert!(matches!(&messages[1].content, MessageContent::Text(t) if t.contains("API error 503")));
    }

    #[tokio::test]
    async fn test_decide_passes_history_and_tools() {
        let client = Arc::new(MockLlmClient::new(vec![CompletionResponse::tools(vec![ToolCall::new(
            "",
            "run_code",
            serde_json::json!({"code": "1"}),
        )])]));
        let oracle = LlmOracle::new(client.clone(), "system", 100, "END");
        let tools = vec![ToolDefinition::new("run_code", "Run", serde_json::json!({"type": "object"}))];

        let decision = oracle.decide(&history(), &tools).await.unwrap();
        match decision {
            Decision::ToolRequest { invocations, .. } => assert_eq!(invocations[0].id, "call_4_0"),
            other => panic!("Expected ToolRequest, got {:?}", other),
        }

        let requests = client.requests();
        assert_eq!(requests[0].system_prompt, "system");
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_decide_transport_error() {
        let client = Arc::new(MockLlmClient::scripted(vec![Err("unavailable".to_string())]));
        let oracle = LlmOracle::new(client, "system", 100, "END");
        let err = oracle.decide(&history(), &[]).await.unwrap_err();
        assert!(matches!(err, OracleError::Transport(_)));
    }
}
