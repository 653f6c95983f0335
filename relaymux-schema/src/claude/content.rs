use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// `content` on a message, or `system`: either a plain string or an ordered
/// list of typed blocks. Kept as an explicit sum type rather than always
/// normalizing to blocks so a plain-string round trip stays exact (P-CM1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn as_blocks(&self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text {
                text: text.clone(),
                cache_control: None,
            }],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }

    /// Concatenation of every text-bearing block, used by the input-token
    /// estimator and by converters that flatten to a plain string.
    pub fn flatten_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Same shape as `MessageContent` but used for the top-level `system` field,
/// which additionally may be omitted entirely.
pub type SystemPrompt = MessageContent;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        CacheControl {
            kind: "ephemeral".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

/// A single content block. Every variant the converters need to reason
/// about is modeled explicitly (§9: "sum types in place of duck typing");
/// anything else would be a client/server protocol violation and is
/// rejected by `serde`'s tagged-enum matching rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Image {
        source: ImageSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<MessageContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn cache_control(&self) -> Option<&CacheControl> {
        match self {
            ContentBlock::Text { cache_control, .. }
            | ContentBlock::Image { cache_control, .. }
            | ContentBlock::ToolUse { cache_control, .. }
            | ContentBlock::ToolResult { cache_control, .. } => cache_control.as_ref(),
            ContentBlock::Thinking { .. }
            | ContentBlock::RedactedThinking { .. }
            | ContentBlock::Unknown => None,
        }
    }

    pub fn is_thinking(&self) -> bool {
        matches!(self, ContentBlock::Thinking { .. })
    }
}

/// `thinking` request parameter: either a bare bool or `{type, budget_tokens}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThinkingConfig {
    Bool(bool),
    Structured {
        #[serde(rename = "type")]
        kind: String,
        budget_tokens: u32,
    },
}

impl ThinkingConfig {
    pub fn enabled(&self) -> bool {
        match self {
            ThinkingConfig::Bool(enabled) => *enabled,
            ThinkingConfig::Structured { .. } => true,
        }
    }

    pub fn budget_tokens(&self, default_budget: u32) -> u32 {
        match self {
            ThinkingConfig::Structured { budget_tokens, .. } => *budget_tokens,
            ThinkingConfig::Bool(_) => default_budget,
        }
    }
}

pub type Extra = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_content_roundtrips() {
        let content: MessageContent = serde_json::from_value(json!("hello there")).unwrap();
        assert_eq!(content.flatten_text(), "hello there");
        assert_eq!(serde_json::to_value(&content).unwrap(), json!("hello there"));
    }

    #[test]
    fn block_content_flattens_text_only() {
        let content: MessageContent = serde_json::from_value(json!([
            {"type": "text", "text": "a"},
            {"type": "tool_use", "id": "x", "name": "f", "input": {}},
            {"type": "text", "text": "b"},
        ]))
        .unwrap();
        assert_eq!(content.flatten_text(), "ab");
    }

    #[test]
    fn thinking_config_bool_vs_structured() {
        let b: ThinkingConfig = serde_json::from_value(json!(true)).unwrap();
        assert!(b.enabled());
        assert_eq!(b.budget_tokens(1024), 1024);

        let s: ThinkingConfig =
            serde_json::from_value(json!({"type": "enabled", "budget_tokens": 2048})).unwrap();
        assert!(s.enabled());
        assert_eq!(s.budget_tokens(1024), 2048);
    }
}
