use super::content::{Extra, MessageContent, Role, SystemPrompt, ThinkingConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// `POST /v1/messages` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessagesRequest {
    pub model: String,
    pub messages: Vec<ClaudeMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// Only `true` is supported; validated at the C11 boundary.
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_management: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub betas: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "anthropic_beta")]
    pub anthropic_beta: Option<Value>,
    #[serde(default, flatten)]
    pub extra: Extra,
}

/// `type ThinkingParam = request.thinking`, re-exported under this name so
/// call sites that only care about the request-level knob (as opposed to
/// the shared `ThinkingConfig` content representation) read clearly.
pub type ThinkingParam = ThinkingConfig;

impl ClaudeMessagesRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn thinking_enabled(&self) -> bool {
        self.thinking.as_ref().is_some_and(ThinkingConfig::enabled)
    }

    /// Concatenation used by both the input-token estimator (C10) and the
    /// cache key (C5): system text, then every message's flattened text, in
    /// order.
    pub fn estimator_text(&self) -> String {
        let mut out = String::new();
        if let Some(system) = &self.system {
            out.push_str(&system.flatten_text());
            out.push('\n');
        }
        for message in &self.messages {
            out.push_str(&message.content.flatten_text());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_request_deserializes() {
        let req: ClaudeMessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(req.messages.len(), 1);
        assert!(!req.is_streaming());
        assert!(!req.thinking_enabled());
    }

    #[test]
    fn unknown_top_level_fields_preserved() {
        let req: ClaudeMessagesRequest = serde_json::from_value(json!({
            "model": "x",
            "max_tokens": 1,
            "messages": [],
            "metadata": {"user_id": "abc"}
        }))
        .unwrap();
        assert_eq!(req.extra.get("metadata"), Some(&json!({"user_id": "abc"})));
    }
}
