//! C8b: Gemini line-delimited JSON stream → Claude SSE events.

use relaymux_schema::claude::{
    ClaudeStreamEvent, ContentBlockPayload, Delta, MessageStartPayload, StopReason, Usage,
};
use relaymux_schema::gemini::GeminiResponseBody;
use relaymux_thinking::{CacheKeyGenerator, ThoughtSignatureEngine};
use std::sync::Arc;

use super::StreamAdapter;

pub struct GeminiAdapter {
    buf: Vec<u8>,
    model: String,
    message_id: String,
    started: bool,
    next_index: u32,
    signature_engine: Arc<ThoughtSignatureEngine>,
    usage: Usage,
    usage_seen: bool,
    saw_tool_use: bool,
    finish_reason: Option<String>,
    output_chars: u64,
}

impl GeminiAdapter {
    pub fn new(message_id: impl Into<String>, model: impl Into<String>, signature_engine: Arc<ThoughtSignatureEngine>) -> Self {
        GeminiAdapter {
            buf: Vec::new(),
            model: model.into(),
            message_id: message_id.into(),
            started: false,
            next_index: 0,
            signature_engine,
            usage: Usage::default(),
            usage_seen: false,
            saw_tool_use: false,
            finish_reason: None,
            output_chars: 0,
        }
    }

    fn ensure_started(&mut self, out: &mut Vec<ClaudeStreamEvent>) {
        if !self.started {
            self.started = true;
            out.push(ClaudeStreamEvent::MessageStart {
                message: MessageStartPayload::new(self.message_id.clone(), self.model.clone(), Usage::default()),
            });
        }
    }

    fn handle_line(&mut self, line: &str) -> Vec<ClaudeStreamEvent> {
        let line = line.trim();
        if line.is_empty() || line == "[" || line == "]" || line == "," {
            return Vec::new();
        }
        let line = line.trim_start_matches(',').trim();
        let Ok(body) = serde_json::from_str::<GeminiResponseBody>(line) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        self.ensure_started(&mut out);

        if let Some(candidate) = body.candidates.first() {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    if let Some(text) = &part.text {
                        self.output_chars += text.chars().count() as u64;
                        if part.thought == Some(true) {
                            let index = self.next_index;
                            self.next_index += 1;
                            out.push(ClaudeStreamEvent::ContentBlockStart {
                                index,
                                content_block: ContentBlockPayload::empty_thinking(),
                            });
                            out.push(ClaudeStreamEvent::ContentBlockDelta {
                                index,
                                delta: Delta::ThinkingDelta { thinking: text.clone() },
                            });
                            let signature = part.thought_signature.clone().or_else(|| {
                                CacheKeyGenerator::generate_text(text)
                                    .and_then(|key| self.signature_engine.get_signature(&key))
                                    .map(|s| s.to_string())
                                    .or_else(|| Some(self.signature_engine.fallback_signature().to_string()))
                            });
                            if let Some(signature) = signature {
                                out.push(ClaudeStreamEvent::ContentBlockDelta {
                                    index,
                                    delta: Delta::SignatureDelta { signature },
                                });
                            }
                            out.push(ClaudeStreamEvent::ContentBlockStop { index });
                        } else {
                            let index = self.next_index;
                            self.next_index += 1;
                            out.push(ClaudeStreamEvent::ContentBlockStart {
                                index,
                                content_block: ContentBlockPayload::empty_text(),
                            });
                            out.push(ClaudeStreamEvent::ContentBlockDelta {
                                index,
                                delta: Delta::TextDelta { text: text.clone() },
                            });
                            out.push(ClaudeStreamEvent::ContentBlockStop { index });
                        }
                    }
                    if let Some(function_call) = &part.function_call {
                        self.saw_tool_use = true;
                        let name = function_call
                            .get("name")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("")
                            .to_string();
                        let args = function_call.get("args").cloned().unwrap_or(serde_json::json!({}));
                        let id = format!("toolu_{}", uuid::Uuid::new_v4().simple());
                        let index = self.next_index;
                        self.next_index += 1;
                        out.push(ClaudeStreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlockPayload::empty_tool_use(id, name),
                        });
                        out.push(ClaudeStreamEvent::ContentBlockDelta {
                            index,
                            delta: Delta::InputJsonDelta {
                                partial_json: args.to_string(),
                            },
                        });
                        out.push(ClaudeStreamEvent::ContentBlockStop { index });
                    }
                }
            }
            if let Some(finish_reason) = &candidate.finish_reason {
                self.finish_reason = Some(finish_reason.clone());
            }
        }

        if let Some(usage) = &body.usageMetadata {
            self.usage_seen = true;
            self.usage.input_tokens = usage
                .get("promptTokenCount")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as u32;
            self.usage.output_tokens = usage
                .get("candidatesTokenCount")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as u32;
        }

        out
    }
}

impl StreamAdapter for GeminiAdapter {
    fn push(&mut self, chunk: &[u8]) -> Vec<ClaudeStreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(0..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).to_string();
            out.extend(self.handle_line(&line));
        }
        out
    }

    fn finish(&mut self) -> Vec<ClaudeStreamEvent> {
        if self.buf.is_empty() {
            return Vec::new();
        }
        let remaining = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&remaining).to_string();
        self.handle_line(&line)
    }

    fn stop_reason(&self) -> StopReason {
        if self.saw_tool_use {
            return StopReason::ToolUse;
        }
        match self.finish_reason.as_deref() {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    }

    fn usage(&self) -> Option<Usage> {
        self.usage_seen.then_some(self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new("msg_1", "gemini-2.5-pro", Arc::new(ThoughtSignatureEngine::new(3600, 1024)))
    }

    #[test]
    fn thought_part_becomes_thinking_block() {
        let mut a = adapter();
        let line = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "pondering", "thought": true}]}}]
        })
        .to_string();
        let events = a.push(format!("{line}\n").as_bytes());
        assert!(events.iter().any(|e| matches!(
            e,
            ClaudeStreamEvent::ContentBlockDelta { delta: Delta::ThinkingDelta { .. }, .. }
        )));
    }

    #[test]
    fn function_call_becomes_tool_use_block() {
        let mut a = adapter();
        let line = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"name": "get_weather", "args": {"city": "sf"}}}]}}]
        })
        .to_string();
        let events = a.push(format!("{line}\n").as_bytes());
        assert!(events.iter().any(|e| matches!(e, ClaudeStreamEvent::ContentBlockStart {
            content_block: ContentBlockPayload::ToolUse { name, .. }, ..
        } if name == "get_weather")));
    }

    #[test]
    fn usage_metadata_populates_final_usage() {
        let mut a = adapter();
        let line = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "hi"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
        })
        .to_string();
        a.push(format!("{line}\n").as_bytes());
        let usage = a.usage().expect("usage metadata was present");
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn function_call_resolves_stop_reason_as_tool_use() {
        let mut a = adapter();
        let line = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"name": "get_weather", "args": {}}}]}}]
        })
        .to_string();
        a.push(format!("{line}\n").as_bytes());
        assert_eq!(a.stop_reason(), StopReason::ToolUse);
    }

    #[test]
    fn max_tokens_finish_reason_resolves_stop_reason() {
        let mut a = adapter();
        let line = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "hi"}]}, "finishReason": "MAX_TOKENS"}]
        })
        .to_string();
        a.push(format!("{line}\n").as_bytes());
        assert_eq!(a.stop_reason(), StopReason::MaxTokens);
    }
}
