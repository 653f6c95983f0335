use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// JSON payload carried by one decoded event-stream frame, dispatched on
/// the frame's `:event-type` header by the stream adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmazonQEventPayload {
    InitialResponse { #[serde(rename = "conversationId")] conversation_id: String },
    AssistantResponseEvent { content: String },
    Other(BTreeMap<String, Value>),
}

/// A frame paired with the `:event-type` header value that identified it,
/// handed to the stream adapter after binary framing is stripped away.
#[derive(Debug, Clone)]
pub struct AmazonQStreamEvent {
    pub event_type: String,
    pub payload: AmazonQEventPayload,
}
