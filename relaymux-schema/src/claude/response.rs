use super::content::{ContentBlock, Extra, Role};
use super::events::{StopReason, Usage};
use serde::{Deserialize, Serialize};

/// Fully assembled (non-streaming) message shape. The proxy never returns
/// this over the wire directly (every response is SSE-framed), but C9
/// assembles one internally to log/test against, and C8d's passthrough
/// adapter may decode an upstream Claude JSON body into it for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
    #[serde(default, flatten)]
    pub extra: Extra,
}

/// Claude-style error envelope: `{"type":"error","error":{"type":...,"message":...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: ClaudeErrorObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ClaudeErrorBody {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        ClaudeErrorBody {
            kind: "error".to_string(),
            error: ClaudeErrorObject {
                kind: error_type.into(),
                message: message.into(),
            },
        }
    }
}
