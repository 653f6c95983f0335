use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenaiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenaiDeltaToolCall {
    /// Present only on the frame that opens the tool call; later deltas for
    /// the same call omit it and are correlated by `index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenaiDeltaFunctionCall>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenaiDeltaFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenaiChoiceDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenaiDeltaToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiChoice {
    pub index: u32,
    pub delta: OpenaiChoiceDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One `data: {...}` SSE chunk from a streaming `chat/completions` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiChatStreamChunk {
    pub id: String,
    pub choices: Vec<OpenaiChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenaiUsage>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Non-streaming response shape, kept for completeness/testing; the proxy
/// always requests `stream: true` upstream (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiChatResponse {
    pub id: String,
    pub choices: Vec<OpenaiResponseChoice>,
    #[serde(default)]
    pub usage: OpenaiUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenaiResponseChoice {
    pub index: u32,
    pub message: super::OpenaiChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_chunk_parses_tool_call_delta() {
        let input = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": ""}
                    }]
                },
                "finish_reason": null
            }]
        });
        let chunk: OpenaiChatStreamChunk = serde_json::from_value(input).unwrap();
        let calls = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            calls[0].function.as_ref().unwrap().name.as_deref(),
            Some("get_weather")
        );
    }
}
