//! C7b: Claude → Gemini `streamGenerateContent` request body.

use std::collections::HashMap;

use relaymux_schema::claude::{
    ClaudeMessage, ClaudeMessagesRequest, ClaudeTool, ContentBlock, MessageContent, Role,
};
use relaymux_schema::gemini::{Content, FunctionDeclaration, GenerationConfig, Part, Tool, ToolConfig};
use serde_json::{json, Value};

use super::ThinkingDirective;

pub fn build_gemini_request(
    request: &ClaudeMessagesRequest,
    thinking: ThinkingDirective,
) -> relaymux_schema::gemini::GeminiGenerateContentRequest {
    let system_instruction = request.system.as_ref().map(|system| Content {
        role: None,
        parts: vec![Part {
            text: Some(system.flatten_text()),
            ..Default::default()
        }],
        extra: Default::default(),
    });

    // tool_use_id -> tool name, needed to recover `functionResponse.name`
    // when converting a later `tool_result` block (§4.7b).
    let mut tool_names: HashMap<String, String> = HashMap::new();
    for message in &request.messages {
        for block in message.content.as_blocks() {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                tool_names.insert(id, name);
            }
        }
    }

    let contents: Vec<Content> = request
        .messages
        .iter()
        .filter_map(|message| convert_message(message, &tool_names))
        .collect();

    let mut generation_config = GenerationConfig {
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k,
        max_output_tokens: Some(request.max_tokens),
        ..Default::default()
    };
    *generation_config.thinking_config_mut() = Some(json!({
        "includeThoughts": thinking.enabled,
        "thinkingBudget": thinking.budget_tokens,
    }));

    let tools = request.tools.as_ref().map(|tools| vec![claude_tools_to_gemini(tools)]);

    relaymux_schema::gemini::GeminiGenerateContentRequest {
        contents,
        system_instruction,
        generation_config: Some(generation_config),
        tools,
        tool_config: request.tool_choice.as_ref().map(claude_tool_choice_to_gemini),
        extra: Default::default(),
    }
}

fn convert_message(message: &ClaudeMessage, tool_names: &HashMap<String, String>) -> Option<Content> {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    let parts: Vec<Part> = message
        .content
        .as_blocks()
        .into_iter()
        .filter_map(|block| convert_block(block, tool_names))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(Content {
        role: Some(role.to_string()),
        parts,
        extra: Default::default(),
    })
}

fn convert_block(block: ContentBlock, tool_names: &HashMap<String, String>) -> Option<Part> {
    match block {
        ContentBlock::Text { text, .. } => Some(Part {
            text: Some(text),
            ..Default::default()
        }),
        ContentBlock::ToolUse { name, input, .. } => Some(Part {
            function_call: Some(json!({"name": name, "args": input})),
            ..Default::default()
        }),
        ContentBlock::ToolResult {
            tool_use_id, content, ..
        } => {
            let name = tool_names
                .get(&tool_use_id)
                .cloned()
                .unwrap_or_else(|| tool_use_id.clone());
            let response_text = content.as_ref().map(MessageContent::flatten_text).unwrap_or_default();
            Some(Part {
                function_response: Some(json!({
                    "name": name,
                    "response": {"content": response_text},
                })),
                ..Default::default()
            })
        }
        ContentBlock::Thinking { thinking, signature } => Some(Part {
            thought: Some(true),
            thought_signature: signature,
            text: Some(thinking),
            ..Default::default()
        }),
        ContentBlock::Image { .. } | ContentBlock::RedactedThinking { .. } | ContentBlock::Unknown => None,
    }
}

fn claude_tools_to_gemini(tools: &[ClaudeTool]) -> Tool {
    let declarations = tools
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            behavior: None,
            parameters: Some(tool.input_schema.clone()),
            parameters_json_schema: None,
            response: None,
            response_json_schema: None,
            extra: Default::default(),
        })
        .collect();
    Tool {
        function_declarations: Some(declarations),
        extra: Default::default(),
    }
}

fn claude_tool_choice_to_gemini(tool_choice: &Value) -> ToolConfig {
    let mode = match tool_choice.get("type").and_then(Value::as_str) {
        Some("any") => "ANY",
        Some("tool") => "ANY",
        Some("none") => "NONE",
        _ => "AUTO",
    };
    ToolConfig {
        function_calling_config: Some(json!({"mode": mode})),
        retrieval_config: None,
        extra: Default::default(),
    }
}
