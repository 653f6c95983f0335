//! C7a: Claude → Amazon Q `GenerateAssistantResponse` request body.

use chrono::Utc;
use relaymux_schema::amazonq::{AmazonQConversationState, AmazonQHistoryEntry, AmazonQRequestBody};
use relaymux_schema::claude::{ClaudeMessage, ClaudeMessagesRequest, ClaudeTool, ContentBlock, Role};

use super::ThinkingDirective;

const THINKING_HINT: &str = "Before responding, reason inside <thinking></thinking> tags, then give your final answer outside them.";

/// One merged, single-role turn before it's serialized into the history's
/// `userInputMessage`/`assistantResponseMessage` shape.
struct MergedTurn {
    role: Role,
    text: String,
}

pub fn build_amazonq_request(
    request: &ClaudeMessagesRequest,
    profile_arn: Option<String>,
    thinking: ThinkingDirective,
) -> AmazonQRequestBody {
    let merged = merge_alternating(&request.messages);

    let mut entries: Vec<AmazonQHistoryEntry> = merged
        .iter()
        .map(|turn| {
            if turn.role == Role::User {
                AmazonQHistoryEntry::user(turn.text.clone(), None)
            } else {
                AmazonQHistoryEntry::assistant(turn.text.clone())
            }
        })
        .collect();

    // Last entry becomes `currentMessage`; everything before it is `history`.
    let current_message = entries.pop().unwrap_or_else(|| AmazonQHistoryEntry::user(String::new(), None));

    let current_message = if thinking.enabled {
        inject_thinking_hint(current_message)
    } else {
        current_message
    };

    let mut context_preamble = preamble();
    if let Some(tools) = &request.tools {
        context_preamble.push_str(&render_tools_hint(tools));
    }
    let current_message = prepend_preamble(current_message, &context_preamble);

    let mut conversation_state = AmazonQConversationState::manual(current_message);
    conversation_state.history = entries;

    AmazonQRequestBody {
        conversation_state,
        profile_arn,
    }
}

/// §4.7a: consecutive same-role messages are concatenated, and the merged
/// sequence is forced to strictly alternate starting with `user` (an empty
/// user turn is prepended if the first merged message is `assistant`).
fn merge_alternating(messages: &[ClaudeMessage]) -> Vec<MergedTurn> {
    let mut merged: Vec<MergedTurn> = Vec::with_capacity(messages.len());
    for message in messages {
        let text = render_blocks(message);
        match merged.last_mut() {
            Some(last) if roles_match(last.role, message.role) => {
                last.text.push('\n');
                last.text.push_str(&text);
            }
            _ => merged.push(MergedTurn {
                role: message.role,
                text,
            }),
        }
    }
    if let Some(first) = merged.first() {
        if first.role != Role::User {
            merged.insert(
                0,
                MergedTurn {
                    role: Role::User,
                    text: String::new(),
                },
            );
        }
    }
    merged
}

fn roles_match(a: Role, b: Role) -> bool {
    matches!((a, b), (Role::User, Role::User) | (Role::Assistant, Role::Assistant))
}

/// Renders one message's content blocks as flat text, per §4.7a: tool use
/// and tool results are serialized inline as pseudo-XML, and thinking
/// blocks are rendered as `<thinking>` regardless of signature.
fn render_blocks(message: &ClaudeMessage) -> String {
    let mut out = String::new();
    for block in message.content.as_blocks() {
        match block {
            ContentBlock::Text { text, .. } => out.push_str(&text),
            ContentBlock::Image { .. } => {}
            ContentBlock::ToolUse { name, input, .. } => {
                out.push_str("<tool_use><name>");
                out.push_str(&name);
                out.push_str("</name><input>");
                out.push_str(&input.to_string());
                out.push_str("</input></tool_use>");
            }
            ContentBlock::ToolResult {
                tool_use_id, content, ..
            } => {
                out.push_str("<tool_result id=\"");
                out.push_str(&tool_use_id);
                out.push_str("\">");
                if let Some(content) = content {
                    out.push_str(&content.flatten_text());
                }
                out.push_str("</tool_result>");
            }
            ContentBlock::Thinking { thinking, .. } => {
                out.push_str("<thinking>");
                out.push_str(&thinking);
                out.push_str("</thinking>");
            }
            ContentBlock::RedactedThinking { .. } | ContentBlock::Unknown => {}
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn inject_thinking_hint(entry: AmazonQHistoryEntry) -> AmazonQHistoryEntry {
    match entry.user_input {
        Some(mut user_input) => {
            if !user_input.content.contains(THINKING_HINT) {
                user_input.content.push_str("\n\n");
                user_input.content.push_str(THINKING_HINT);
            }
            AmazonQHistoryEntry::user(user_input.content, user_input.context)
        }
        None => entry,
    }
}

fn preamble() -> String {
    format!(
        "--- context ---\ncurrent time: {}\n--- end context ---\n\n",
        Utc::now().to_rfc3339()
    )
}

fn prepend_preamble(entry: AmazonQHistoryEntry, preamble: &str) -> AmazonQHistoryEntry {
    match entry.user_input {
        Some(mut user_input) => {
            user_input.content = format!("{preamble}{}", user_input.content);
            AmazonQHistoryEntry::user(user_input.content, user_input.context)
        }
        None => entry,
    }
}

/// Serializes `ClaudeTool` definitions the way the context preamble refers
/// to them; Amazon Q has no native tool-schema field, so tool availability
/// is communicated purely through prompt text.
pub fn render_tools_hint(tools: &[ClaudeTool]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = String::from("available tools:\n");
    for tool in tools {
        out.push_str("- ");
        out.push_str(&tool.name);
        if let Some(description) = &tool.description {
            out.push_str(": ");
            out.push_str(description);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymux_schema::claude::MessageContent;

    fn msg(role: Role, text: &str) -> ClaudeMessage {
        ClaudeMessage {
            role,
            content: MessageContent::Text(text.to_string()),
        }
    }

    fn request(messages: Vec<ClaudeMessage>) -> ClaudeMessagesRequest {
        ClaudeMessagesRequest {
            model: "claude-opus-4".into(),
            messages,
            system: None,
            max_tokens: 1024,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: Some(true),
            context_management: None,
            betas: None,
            anthropic_beta: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn consecutive_same_role_messages_merge() {
        let req = request(vec![
            msg(Role::User, "hello"),
            msg(Role::User, "world"),
            msg(Role::Assistant, "hi"),
        ]);
        let body = build_amazonq_request(&req, None, ThinkingDirective { enabled: false, budget_tokens: 0 });
        assert_eq!(body.conversation_state.history.len(), 1);
        assert!(body.conversation_state.history[0].is_user());
    }

    #[test]
    fn leading_assistant_message_gets_empty_user_prepended() {
        let req = request(vec![msg(Role::Assistant, "hi there")]);
        let body = build_amazonq_request(&req, None, ThinkingDirective { enabled: false, budget_tokens: 0 });
        assert_eq!(body.conversation_state.history.len(), 1);
        assert!(body.conversation_state.history[0].is_user());
        assert!(body.conversation_state.current_message.assistant_response.is_some());
    }

    #[test]
    fn thinking_hint_injected_into_current_user_turn() {
        let req = request(vec![msg(Role::User, "what is rust?")]);
        let body = build_amazonq_request(&req, None, ThinkingDirective { enabled: true, budget_tokens: 1024 });
        let content = &body
            .conversation_state
            .current_message
            .user_input
            .as_ref()
            .unwrap()
            .content;
        assert!(content.contains(THINKING_HINT));
    }
}
