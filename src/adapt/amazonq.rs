//! C8a: Amazon Q binary event-stream → Claude SSE events.

use relaymux_schema::amazonq::{AmazonQEventPayload, AmazonQStreamEvent};
use relaymux_schema::claude::{
    ClaudeStreamEvent, ContentBlockPayload, Delta, MessageStartPayload, StopReason, Usage,
};
use relaymux_thinking::{TagEvent, ThinkingTagParser};

use super::StreamAdapter;

const PRELUDE_LEN: usize = 12;
const TRAILING_CRC_LEN: usize = 4;

pub struct AmazonQAdapter {
    buf: Vec<u8>,
    model: String,
    message_id: String,
    started: bool,
    text_index: Option<u32>,
    thinking_index: Option<u32>,
    next_index: u32,
    tag_parser: ThinkingTagParser,
    output_chars: u64,
}

impl AmazonQAdapter {
    pub fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        AmazonQAdapter {
            buf: Vec::new(),
            model: model.into(),
            message_id: message_id.into(),
            started: false,
            text_index: None,
            thinking_index: None,
            next_index: 0,
            tag_parser: ThinkingTagParser::new(),
            output_chars: 0,
        }
    }

    pub fn output_chars(&self) -> u64 {
        self.output_chars
    }

    fn drain_frames(&mut self) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        loop {
            let Some((frame_len, frame)) = Self::try_parse_frame(&self.buf) else {
                break;
            };
            out.extend(self.handle_frame(&frame));
            self.buf.drain(0..frame_len);
        }
        out
    }

    /// Returns `(total_frame_length, payload_bytes)` if `buf` holds at
    /// least one complete frame.
    fn try_parse_frame(buf: &[u8]) -> Option<(usize, AmazonQStreamEvent)> {
        if buf.len() < PRELUDE_LEN {
            return None;
        }
        let total_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let headers_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if buf.len() < total_len {
            return None;
        }
        let headers_start = PRELUDE_LEN;
        let headers_end = headers_start + headers_len;
        let payload_start = headers_end;
        let payload_end = total_len - TRAILING_CRC_LEN;
        if payload_end < payload_start {
            return None;
        }
        let headers = parse_headers(&buf[headers_start..headers_end]);
        let event_type = headers
            .get(":event-type")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let payload: AmazonQEventPayload =
            serde_json::from_slice(&buf[payload_start..payload_end]).unwrap_or(AmazonQEventPayload::Other(
                Default::default(),
            ));
        Some((total_len, AmazonQStreamEvent { event_type, payload }))
    }

    fn handle_frame(&mut self, frame: &AmazonQStreamEvent) -> Vec<ClaudeStreamEvent> {
        match &frame.payload {
            AmazonQEventPayload::InitialResponse { .. } => {
                if self.started {
                    return Vec::new();
                }
                self.started = true;
                vec![ClaudeStreamEvent::MessageStart {
                    message: MessageStartPayload::new(self.message_id.clone(), self.model.clone(), Usage::default()),
                }]
            }
            AmazonQEventPayload::AssistantResponseEvent { content } => self.handle_text(content),
            AmazonQEventPayload::Other(_) => Vec::new(),
        }
    }

    /// Runs new text through the `<thinking>` tag parser and opens/closes
    /// content blocks as the parser crosses tag boundaries (§4.8a).
    fn handle_text(&mut self, content: &str) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        self.output_chars += content.chars().count() as u64;
        for event in self.tag_parser.push(content) {
            match event {
                TagEvent::ThinkingStart => {
                    self.close_text_block(&mut out);
                    let index = self.next_index;
                    self.next_index += 1;
                    self.thinking_index = Some(index);
                    out.push(ClaudeStreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlockPayload::empty_thinking(),
                    });
                }
                TagEvent::ThinkingDelta(text) => {
                    let index = *self.thinking_index.get_or_insert_with(|| {
                        let index = self.next_index;
                        self.next_index += 1;
                        out.push(ClaudeStreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlockPayload::empty_thinking(),
                        });
                        index
                    });
                    out.push(ClaudeStreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::ThinkingDelta { thinking: text },
                    });
                }
                TagEvent::ThinkingEnd => self.close_thinking_block(&mut out),
                TagEvent::Text(text) => {
                    let index = *self.text_index.get_or_insert_with(|| {
                        let index = self.next_index;
                        self.next_index += 1;
                        out.push(ClaudeStreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlockPayload::empty_text(),
                        });
                        index
                    });
                    out.push(ClaudeStreamEvent::ContentBlockDelta {
                        index,
                        delta: Delta::TextDelta { text },
                    });
                }
            }
        }
        out
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

impl StreamAdapter for AmazonQAdapter {
    fn push(&mut self, chunk: &[u8]) -> Vec<ClaudeStreamEvent> {
        self.buf.extend_from_slice(chunk);
        self.drain_frames()
    }

    fn finish(&mut self) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        let parser = std::mem::take(&mut self.tag_parser);
        for event in parser.finish() {
            match event {
                TagEvent::Text(text) if !text.is_empty() => {
                    out.extend(self.handle_text_direct_delta(text, false));
                }
                TagEvent::ThinkingDelta(text) if !text.is_empty() => {
                    out.extend(self.handle_text_direct_delta(text, true));
                }
                _ => {}
            }
        }
        self.close_text_block(&mut out);
        self.close_thinking_block(&mut out);
        out
    }

    /// CodeWhisperer's streaming protocol carries no finish-reason or
    /// token-usage signal, so this channel can only ever report `EndTurn`
    /// and has no real usage to contribute.
    fn stop_reason(&self) -> StopReason {
        StopReason::EndTurn
    }

    fn usage(&self) -> Option<Usage> {
        None
    }
}

impl AmazonQAdapter {
    fn handle_text_direct_delta(&mut self, text: String, is_thinking: bool) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        if is_thinking {
            let index = *self.thinking_index.get_or_insert_with(|| {
                let index = self.next_index;
                self.next_index += 1;
                out.push(ClaudeStreamEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlockPayload::empty_thinking(),
                });
                index
            });
            out.push(ClaudeStreamEvent::ContentBlockDelta {
                index,
                delta: Delta::ThinkingDelta { thinking: text },
            });
        } else {
            let index = *self.text_index.get_or_insert_with(|| {
                let index = self.next_index;
                self.next_index += 1;
                out.push(ClaudeStreamEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlockPayload::empty_text(),
                });
                index
            });
            out.push(ClaudeStreamEvent::ContentBlockDelta {
                index,
                delta: Delta::TextDelta { text },
            });
        }
        out
    }
}

/// Parses `:name` headers out of an event-stream frame's header block.
/// Only the string-value header type (AWS event-stream type `7`) is used
/// by CodeWhisperer's framing, so that's the only variant handled.
fn parse_headers(mut bytes: &[u8]) -> std::collections::HashMap<String, String> {
    let mut headers = std::collections::HashMap::new();
    while bytes.len() > 2 {
        let name_len = bytes[0] as usize;
        if bytes.len() < 1 + name_len + 1 {
            break;
        }
        let name = String::from_utf8_lossy(&bytes[1..1 + name_len]).to_string();
        let value_type = bytes[1 + name_len];
        let mut offset = 1 + name_len + 1;
        let value = if value_type == 7 {
            if bytes.len() < offset + 2 {
                break;
            }
            let value_len = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as usize;
            offset += 2;
            if bytes.len() < offset + value_len {
                break;
            }
            let value = String::from_utf8_lossy(&bytes[offset..offset + value_len]).to_string();
            offset += value_len;
            value
        } else {
            break;
        };
        headers.insert(name, value);
        bytes = &bytes[offset..];
    }
    headers
}

/// Builds one CodeWhisperer event-stream frame, used by tests to exercise
/// the decoder the same way the real binary protocol would.
#[cfg(test)]
pub fn encode_frame(event_type: &str, payload_json: &str) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    let name = ":event-type";
    header_bytes.push(name.len() as u8);
    header_bytes.extend_from_slice(name.as_bytes());
    header_bytes.push(7u8);
    header_bytes.extend_from_slice(&(event_type.len() as u16).to_be_bytes());
    header_bytes.extend_from_slice(event_type.as_bytes());

    let headers_len = header_bytes.len() as u32;
    let payload = payload_json.as_bytes();
    let total_len = (PRELUDE_LEN + header_bytes.len() + payload.len() + TRAILING_CRC_LEN) as u32;

    let mut frame = Vec::new();
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&headers_len.to_be_bytes());
    let prelude_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&prelude_crc.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    let message_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&message_crc.to_be_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_initial_response_then_three_text_deltas() {
        let mut adapter = AmazonQAdapter::new("msg_1", "claude-opus-4");
        let mut events = adapter.push(&encode_frame(
            "initial-response",
            r#"{"conversationId": "conv-1"}"#,
        ));
        assert!(matches!(events.remove(0), ClaudeStreamEvent::MessageStart { .. }));

        for chunk in ["foo", "bar", "baz"] {
            let frame = encode_frame("assistantResponseEvent", &format!(r#"{{"content": "{chunk}"}}"#));
            events.extend(adapter.push(&frame));
        }

        let deltas: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ClaudeStreamEvent::ContentBlockDelta {
                    delta: Delta::TextDelta { text },
                    ..
                } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn split_frame_across_chunk_boundary_still_decodes() {
        let mut adapter = AmazonQAdapter::new("msg_1", "model");
        let frame = encode_frame("assistantResponseEvent", r#"{"content": "hello"}"#);
        let (head, tail) = frame.split_at(frame.len() / 2);
        assert!(adapter.push(head).is_empty());
        let events = adapter.push(tail);
        assert!(events.iter().any(|e| matches!(
            e,
            ClaudeStreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
                ..
            } if text == "hello"
        )));
    }

    #[test]
    fn thinking_tags_open_and_close_thinking_block() {
        let mut adapter = AmazonQAdapter::new("msg_1", "model");
        let frame = encode_frame(
            "assistantResponseEvent",
            r#"{"content": "<thinking>reasoning</thinking>answer"}"#,
        );
        let events = adapter.push(&frame);
        assert!(events.iter().any(|e| matches!(
            e,
            ClaudeStreamEvent::ContentBlockDelta { delta: Delta::ThinkingDelta { .. }, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ClaudeStreamEvent::ContentBlockDelta { delta: Delta::TextDelta { text }, .. } if text == "answer"
        )));
    }
}
