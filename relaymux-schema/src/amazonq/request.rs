use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One already-merged, alternating history turn (§4.7 C7a: "conversation
/// history is merged so consecutive same-role messages are concatenated").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmazonQHistoryEntry {
    #[serde(rename = "userInputMessage", skip_serializing_if = "Option::is_none")]
    pub user_input: Option<AmazonQUserInputMessage>,
    #[serde(rename = "assistantResponseMessage", skip_serializing_if = "Option::is_none")]
    pub assistant_response: Option<AmazonQAssistantResponseMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmazonQUserInputMessage {
    pub content: String,
    #[serde(rename = "userInputMessageContext", skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmazonQAssistantResponseMessage {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmazonQConversationState {
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub history: Vec<AmazonQHistoryEntry>,
    #[serde(rename = "currentMessage")]
    pub current_message: AmazonQHistoryEntry,
    #[serde(rename = "chatTriggerType")]
    pub chat_trigger_type: String,
}

/// `GenerateAssistantResponse` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmazonQRequestBody {
    #[serde(rename = "conversationState")]
    pub conversation_state: AmazonQConversationState,
    #[serde(rename = "profileArn", skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
}

impl AmazonQConversationState {
    pub fn manual(current_message: AmazonQHistoryEntry) -> Self {
        AmazonQConversationState {
            conversation_id: None,
            history: Vec::new(),
            current_message,
            chat_trigger_type: "MANUAL".to_string(),
        }
    }
}

impl AmazonQHistoryEntry {
    pub fn user(content: impl Into<String>, context: Option<Value>) -> Self {
        AmazonQHistoryEntry {
            user_input: Some(AmazonQUserInputMessage {
                content: content.into(),
                context,
            }),
            assistant_response: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        AmazonQHistoryEntry {
            user_input: None,
            assistant_response: Some(AmazonQAssistantResponseMessage {
                content: content.into(),
            }),
        }
    }

    pub fn is_user(&self) -> bool {
        self.user_input.is_some()
    }
}
