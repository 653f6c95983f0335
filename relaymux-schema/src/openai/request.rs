use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One entry of `tool_calls[]` on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OpenaiFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments, matching upstream's string-not-object convention.
    pub arguments: String,
}

/// `messages[]` entry. `content` is `None` for an assistant message that is
/// pure tool calls, and `tool_call_id` is only set on `role: "tool"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenaiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl OpenaiChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        OpenaiChatMessage {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        OpenaiChatMessage {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<OpenaiToolCall>>) -> Self {
        OpenaiChatMessage {
            role: "assistant".to_string(),
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        OpenaiChatMessage {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }
}

/// `tools[].function` — the Claude `input_schema` is carried verbatim as
/// `parameters` (P-CM2: triple round-trips unchanged).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OpenaiFunction,
}

impl OpenaiTool {
    pub fn function(function: OpenaiFunction) -> Self {
        OpenaiTool {
            kind: "function".to_string(),
            function,
        }
    }
}

/// `POST {api_base}/v1/chat/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiChatRequest {
    pub model: String,
    pub messages: Vec<OpenaiChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenaiTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}
