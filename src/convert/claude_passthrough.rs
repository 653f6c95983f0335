//! C7d: Claude passthrough. Forwarded (almost) verbatim; the only
//! transformation is the Azure-specific cleanup in §4.7d, applied when the
//! account's extension names `provider: "azure"`.

use relaymux_schema::claude::ClaudeMessagesRequest;
use serde_json::Value;

pub fn build_claude_passthrough_request(
    request: &ClaudeMessagesRequest,
    target_model: &str,
    is_azure: bool,
) -> Value {
    let mut value = serde_json::to_value(request).expect("ClaudeMessagesRequest always serializes");
    if let Some(obj) = value.as_object_mut() {
        obj.insert("model".to_string(), Value::String(target_model.to_string()));
    }
    if is_azure {
        azure_cleanup(&mut value);
    }
    value
}

/// §4.7d / P-AZURE: strip fields Azure's Claude-compatible endpoint
/// rejects, and rewrite history `thinking` blocks that lack a usable
/// signature into plain text so Azure doesn't choke on them.
pub fn azure_cleanup(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        obj.remove("context_management");
        obj.remove("betas");
        obj.remove("anthropic_beta");
    }

    let Some(messages) = value.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };
    for message in messages.iter_mut() {
        rewrite_thinking_blocks(message);
    }

    let last_assistant_keeps_thinking = messages
        .iter()
        .rev()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
        .is_some_and(assistant_starts_with_signed_thinking);

    if !last_assistant_keeps_thinking {
        if let Some(obj) = value.as_object_mut() {
            obj.remove("thinking");
        }
    }
}

fn rewrite_thinking_blocks(message: &mut Value) {
    let Some(blocks) = message.get_mut("content").and_then(Value::as_array_mut) else {
        return;
    };
    blocks.retain_mut(|block| {
        let Some(kind) = block.get("type").and_then(Value::as_str) else {
            return true;
        };
        match kind {
            "thinking" => {
                let has_signature = block
                    .get("signature")
                    .and_then(Value::as_str)
                    .is_some_and(|s| !s.is_empty());
                if !has_signature {
                    let thinking_text = block.get("thinking").and_then(Value::as_str).unwrap_or_default();
                    *block = serde_json::json!({
                        "type": "text",
                        "text": format!("<previous_thinking>{thinking_text}</previous_thinking>"),
                    });
                }
                true
            }
            "redacted_thinking" => block.get("data").and_then(Value::as_str).is_some_and(|d| !d.is_empty()),
            _ => true,
        }
    });
}

fn assistant_starts_with_signed_thinking(message: &Value) -> bool {
    let Some(first_block) = message.get("content").and_then(Value::as_array).and_then(|blocks| blocks.first())
    else {
        return false;
    };
    first_block.get("type").and_then(Value::as_str) == Some("thinking")
        && first_block
            .get("signature")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_context_management_and_beta_fields() {
        let mut value = json!({
            "model": "claude-3-5-sonnet",
            "messages": [],
            "context_management": {"foo": "bar"},
            "betas": ["x"],
            "anthropic_beta": "y"
        });
        azure_cleanup(&mut value);
        assert!(value.get("context_management").is_none());
        assert!(value.get("betas").is_none());
        assert!(value.get("anthropic_beta").is_none());
    }

    #[test]
    fn unsigned_thinking_block_rewritten_to_text() {
        let mut value = json!({
            "model": "claude-3-5-sonnet",
            "messages": [{
                "role": "assistant",
                "content": [{"type": "thinking", "thinking": "reasoning here"}]
            }]
        });
        azure_cleanup(&mut value);
        let block = &value["messages"][0]["content"][0];
        assert_eq!(block["type"], json!("text"));
        assert_eq!(block["text"], json!("<previous_thinking>reasoning here</previous_thinking>"));
    }

    #[test]
    fn signed_thinking_block_on_last_assistant_message_keeps_top_level_thinking() {
        let mut value = json!({
            "model": "claude-3-5-sonnet",
            "thinking": {"type": "enabled", "budget_tokens": 1024},
            "messages": [{
                "role": "assistant",
                "content": [{"type": "thinking", "thinking": "reasoning", "signature": "sig123"}]
            }]
        });
        azure_cleanup(&mut value);
        assert!(value.get("thinking").is_some());
        assert_eq!(value["messages"][0]["content"][0]["type"], json!("thinking"));
    }

    #[test]
    fn missing_signature_on_last_assistant_message_strips_top_level_thinking() {
        let mut value = json!({
            "model": "claude-3-5-sonnet",
            "thinking": {"type": "enabled", "budget_tokens": 1024},
            "messages": [{
                "role": "assistant",
                "content": [{"type": "text", "text": "hi"}]
            }]
        });
        azure_cleanup(&mut value);
        assert!(value.get("thinking").is_none());
    }

    #[test]
    fn redacted_thinking_without_data_is_removed() {
        let mut value = json!({
            "model": "m",
            "messages": [{
                "role": "assistant",
                "content": [{"type": "redacted_thinking", "data": ""}, {"type": "text", "text": "hi"}]
            }]
        });
        azure_cleanup(&mut value);
        let content = value["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], json!("text"));
    }
}
