//! C7c: Claude → OpenAI-compatible `chat/completions` request body.

use relaymux_schema::claude::{ClaudeMessage, ClaudeMessagesRequest, ClaudeTool, ContentBlock, Role};
use relaymux_schema::openai::{
    OpenaiChatMessage, OpenaiChatRequest, OpenaiFunction, OpenaiFunctionCall, OpenaiTool, OpenaiToolCall,
};

use super::{ThinkingDirective, THINKING_HINT};

pub fn build_openai_request(request: &ClaudeMessagesRequest, thinking: ThinkingDirective) -> OpenaiChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    let mut system_text = request.system.as_ref().map(|s| s.flatten_text()).unwrap_or_default();
    if thinking.enabled {
        if !system_text.is_empty() {
            system_text.push_str("\n\n");
        }
        system_text.push_str(THINKING_HINT);
    }
    if !system_text.is_empty() {
        messages.push(OpenaiChatMessage::system(system_text));
    }

    for message in &request.messages {
        messages.extend(convert_message(message));
    }

    let tools = request.tools.as_ref().map(|tools| tools.iter().map(claude_tool_to_openai).collect());

    OpenaiChatRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: Some(request.max_tokens),
        stop: request.stop_sequences.clone(),
        tools,
        tool_choice: request.tool_choice.clone(),
        stream: true,
        stream_options: Some(serde_json::json!({"include_usage": true})),
        extra: Default::default(),
    }
}

/// A single Claude message may expand into several OpenAI messages: text
/// and thinking blocks collapse into one assistant turn (with tool calls
/// attached), while each `tool_result` becomes its own `role: "tool"`
/// message (§4.7c).
fn convert_message(message: &ClaudeMessage) -> Vec<OpenaiChatMessage> {
    let blocks = message.content.as_blocks();
    match message.role {
        Role::User => {
            let mut out = Vec::new();
            let mut text = String::new();
            for block in &blocks {
                match block {
                    ContentBlock::Text { text: t, .. } => {
                        text.push_str(t);
                    }
                    ContentBlock::ToolResult { tool_use_id, content, .. } => {
                        let rendered = content.as_ref().map(|c| c.flatten_text()).unwrap_or_default();
                        out.push(OpenaiChatMessage::tool(tool_use_id.clone(), rendered));
                    }
                    _ => {}
                }
            }
            if !text.is_empty() {
                out.insert(0, OpenaiChatMessage::user(text));
            }
            out
        }
        Role::Assistant => {
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for block in &blocks {
                match block {
                    ContentBlock::Text { text: t, .. } => text.push_str(t),
                    ContentBlock::Thinking { thinking, .. } => {
                        text.push_str("<thinking>");
                        text.push_str(thinking);
                        text.push_str("</thinking>");
                    }
                    ContentBlock::ToolUse { id, name, input, .. } => {
                        tool_calls.push(OpenaiToolCall {
                            id: id.clone(),
                            kind: "function".to_string(),
                            function: OpenaiFunctionCall {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        });
                    }
                    _ => {}
                }
            }
            let content = (!text.is_empty()).then_some(text);
            let tool_calls = (!tool_calls.is_empty()).then_some(tool_calls);
            if content.is_none() && tool_calls.is_none() {
                Vec::new()
            } else {
                vec![OpenaiChatMessage::assistant(content, tool_calls)]
            }
        }
    }
}

fn claude_tool_to_openai(tool: &ClaudeTool) -> OpenaiTool {
    OpenaiTool::function(OpenaiFunction {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.input_schema.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymux_schema::claude::MessageContent;
    use serde_json::json;

    fn request() -> ClaudeMessagesRequest {
        ClaudeMessagesRequest {
            model: "gpt-4o".into(),
            messages: Vec::new(),
            system: None,
            max_tokens: 256,
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
    fn thinking_hint_injected_into_system_message() {
        let body = build_openai_request(&request(), ThinkingDirective { enabled: true, budget_tokens: 0 });
        assert_eq!(body.messages[0].role, "system");
        assert!(body.messages[0].content.as_ref().unwrap().contains(THINKING_HINT));
    }

    #[test]
    fn tool_use_maps_to_tool_call_with_stringified_arguments() {
        let mut req = request();
        req.messages.push(ClaudeMessage {
            role: Role::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "lookup".into(),
                input: json!({"q": "rust"}),
                cache_control: None,
            }]),
        });
        let body = build_openai_request(&req, ThinkingDirective { enabled: false, budget_tokens: 0 });
        let msg = body.messages.last().unwrap();
        let call = &msg.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "lookup");
        assert_eq!(call.function.arguments, json!({"q": "rust"}).to_string());
    }

    #[test]
    fn tool_result_becomes_tool_role_message_with_preserved_id() {
        let mut req = request();
        req.messages.push(ClaudeMessage {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "call_1".into(),
                content: Some(MessageContent::Text("result".into())),
                is_error: None,
                cache_control: None,
            }]),
        });
        let body = build_openai_request(&req, ThinkingDirective { enabled: false, budget_tokens: 0 });
        let msg = body.messages.last().unwrap();
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }
}
