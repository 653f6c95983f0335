//! C8c: OpenAI-compatible SSE stream → Claude SSE events.

use std::collections::HashMap;

use relaymux_schema::claude::{
    ClaudeStreamEvent, ContentBlockPayload, Delta, MessageStartPayload, StopReason, Usage,
};
use relaymux_schema::openai::OpenaiChatStreamChunk;
use relaymux_thinking::{TagEvent, ThinkingTagParser};

use super::StreamAdapter;

struct ToolCallState {
    index: u32,
}

pub struct OpenaiAdapter {
    buf: Vec<u8>,
    model: String,
    message_id: String,
    started: bool,
    done: bool,
    text_index: Option<u32>,
    thinking_index: Option<u32>,
    next_index: u32,
    tag_parser: ThinkingTagParser,
    tool_calls: HashMap<u32, ToolCallState>,
    usage: Usage,
    usage_seen: bool,
    finish_reason: Option<String>,
}

impl OpenaiAdapter {
    pub fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        OpenaiAdapter {
            buf: Vec::new(),
            model: model.into(),
            message_id: message_id.into(),
            started: false,
            done: false,
            text_index: None,
            thinking_index: None,
            next_index: 0,
            tag_parser: ThinkingTagParser::new(),
            tool_calls: HashMap::new(),
            usage: Usage::default(),
            usage_seen: false,
            finish_reason: None,
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

    fn handle_event_line(&mut self, data: &str) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        if data == "[DONE]" {
            self.done = true;
            self.close_text_block(&mut out);
            self.close_thinking_block(&mut out);
            return out;
        }
        let Ok(chunk) = serde_json::from_str::<OpenaiChatStreamChunk>(data) else {
            return out;
        };
        self.ensure_started(&mut out);

        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                out.extend(self.handle_text(content));
            }
            if let Some(tool_calls) = &choice.delta.tool_calls {
                for call in tool_calls {
                    out.extend(self.handle_tool_call_delta(call));
                }
            }
            if let Some(finish_reason) = &choice.finish_reason {
                self.finish_reason = Some(finish_reason.clone());
            }
        }
        if let Some(usage) = chunk.usage {
            self.usage_seen = true;
            self.usage.input_tokens = usage.prompt_tokens;
            self.usage.output_tokens = usage.completion_tokens;
        }
        out
    }

    fn handle_text(&mut self, content: &str) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        for event in self.tag_parser.push(content) {
            match event {
                TagEvent::ThinkingStart => self.close_text_block(&mut out),
                TagEvent::ThinkingDelta(text) => {
                    let index = self.open_thinking_block(&mut out);
                    out.push(ClaudeStreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::ThinkingDelta { thinking: text },
                    });
                }
                TagEvent::ThinkingEnd => self.close_thinking_block(&mut out),
                TagEvent::Text(text) => {
                    let index = self.open_text_block(&mut out);
                    out.push(ClaudeStreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::TextDelta { text },
                    });
                }
            }
        }
        out
    }

    fn handle_tool_call_delta(
        &mut self,
        call: &relaymux_schema::openai::OpenaiDeltaToolCall,
    ) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        self.close_text_block(&mut out);
        self.close_thinking_block(&mut out);

        let state_index = if let Some(state) = self.tool_calls.get(&call.index) {
            state.index
        } else {
            let id = call.id.clone().unwrap_or_default();
            let name = call.function.as_ref().and_then(|f| f.name.clone()).unwrap_or_default();
            let index = self.next_index;
            self.next_index += 1;
            self.tool_calls.insert(call.index, ToolCallState { index });
            out.push(ClaudeStreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockPayload::empty_tool_use(id, name),
            });
            index
        };

        if let Some(function) = &call.function {
            if let Some(args) = &function.arguments {
                if !args.is_empty() {
                    out.push(ClaudeStreamEvent::ContentBlockDelta {
                        index: state_index,
                        delta: Delta::InputJsonDelta {
                            partial_json: args.clone(),
                        },
                    });
                }
            }
        }
        out
    }

    fn open_text_block(&mut self, out: &mut Vec<ClaudeStreamEvent>) -> u32 {
        *self.text_index.get_or_insert_with(|| {
            let index = self.next_index;
            self.next_index += 1;
            out.push(ClaudeStreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockPayload::empty_text(),
            });
            index
        })
    }

    fn open_thinking_block(&mut self, out: &mut Vec<ClaudeStreamEvent>) -> u32 {
        *self.thinking_index.get_or_insert_with(|| {
            let index = self.next_index;
            self.next_index += 1;
            out.push(ClaudeStreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockPayload::empty_thinking(),
            });
            index
        })
    }

    fn close_text_block(&mut self, out: &mut Vec<ClaudeStreamEvent>) {
        if let Some(index) = self.text_index.take() {
            out.push(ClaudeStreamEvent::ContentBlockStop { index });
        }
    }

    fn close_thinking_block(&mut self, out: &mut Vec<ClaudeStreamEvent>) {
        if let Some(index) = self.thinking_index.take() {
            out.push(ClaudeStreamEvent::ContentBlockStop { index });
        }
    }
}

impl StreamAdapter for OpenaiAdapter {
    fn push(&mut self, chunk: &[u8]) -> Vec<ClaudeStreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(0..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).to_string();
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                out.extend(self.handle_event_line(data.trim()));
            }
        }
        out
    }

    fn finish(&mut self) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        if !self.done {
            let parser = std::mem::take(&mut self.tag_parser);
            for event in parser.finish() {
                if let TagEvent::Text(text) | TagEvent::ThinkingDelta(text) = event {
                    if !text.is_empty() {
                        out.extend(self.handle_text(&text));
                    }
                }
            }
            self.close_text_block(&mut out);
            self.close_thinking_block(&mut out);
        }
        out
    }

    fn stop_reason(&self) -> StopReason {
        match self.finish_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            Some("tool_calls" | "function_call") => StopReason::ToolUse,
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

    fn sse(data: &str) -> Vec<u8> {
        format!("data: {data}\n").into_bytes()
    }

    #[test]
    fn content_delta_thinking_tags_split_blocks() {
        let mut adapter = OpenaiAdapter::new("msg_1", "gpt-4o");
        let chunk = serde_json::json!({
            "id": "c1",
            "choices": [{"index": 0, "delta": {"content": "<thinking>hm</thinking>ok"}, "finish_reason": null}]
        });
        let events = adapter.push(&sse(&chunk.to_string()));
        assert!(events.iter().any(|e| matches!(e, ClaudeStreamEvent::ContentBlockDelta { delta: Delta::ThinkingDelta { .. }, .. })));
        assert!(events.iter().any(|e| matches!(e, ClaudeStreamEvent::ContentBlockDelta { delta: Delta::TextDelta { text }, .. } if text == "ok")));
    }

    #[test]
    fn tool_call_delta_streams_as_input_json_delta() {
        let mut adapter = OpenaiAdapter::new("msg_1", "gpt-4o");
        let chunk = serde_json::json!({
            "id": "c1",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"index": 0, "id": "call_1", "type": "function", "function": {"name": "lookup", "arguments": ""}}]},
                "finish_reason": null
            }]
        });
        adapter.push(&sse(&chunk.to_string()));
        let chunk2 = serde_json::json!({
            "id": "c1",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"q\":1}"}}]},
                "finish_reason": null
            }]
        });
        let events = adapter.push(&sse(&chunk2.to_string()));
        assert!(events.iter().any(|e| matches!(e, ClaudeStreamEvent::ContentBlockDelta { delta: Delta::InputJsonDelta { partial_json }, .. } if partial_json.contains('q'))));
    }

    #[test]
    fn done_marker_closes_open_blocks() {
        let mut adapter = OpenaiAdapter::new("msg_1", "gpt-4o");
        let chunk = serde_json::json!({
            "id": "c1",
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": null}]
        });
        adapter.push(&sse(&chunk.to_string()));
        let events = adapter.push(b"data: [DONE]\n");
        assert!(events.iter().any(|e| matches!(e, ClaudeStreamEvent::ContentBlockStop { .. })));
    }

    #[test]
    fn finish_reason_length_resolves_to_max_tokens() {
        let mut adapter = OpenaiAdapter::new("msg_1", "gpt-4o");
        let chunk = serde_json::json!({
            "id": "c1",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "length"}]
        });
        adapter.push(&sse(&chunk.to_string()));
        assert_eq!(adapter.stop_reason(), StopReason::MaxTokens);
    }

    #[test]
    fn usage_is_none_until_upstream_reports_it() {
        let mut adapter = OpenaiAdapter::new("msg_1", "gpt-4o");
        assert!(adapter.usage().is_none());
        let chunk = serde_json::json!({
            "id": "c1",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2}
        });
        adapter.push(&sse(&chunk.to_string()));
        let usage = adapter.usage().expect("usage was reported");
        assert_eq!(usage.input_tokens, 5);
        assert_eq!(usage.output_tokens, 2);
    }
}
