//! C8d: Claude passthrough. Bytes are forwarded almost unchanged; the only
//! rewrite is patching emulated cache-stat fields from C5 into the single
//! `message_start` event (§4.8d).

use relaymux_schema::claude::{ClaudeStreamEvent, StopReason, Usage};

use super::StreamAdapter;

pub struct ClaudePassthroughAdapter {
    buf: Vec<u8>,
    cache_creation_tokens: u32,
    cache_read_tokens: u32,
}

impl ClaudePassthroughAdapter {
    pub fn new(cache_creation_tokens: u32, cache_read_tokens: u32) -> Self {
        ClaudePassthroughAdapter {
            buf: Vec::new(),
            cache_creation_tokens,
            cache_read_tokens,
        }
    }

    fn handle_data_line(&self, data: &str) -> Vec<ClaudeStreamEvent> {
        let Ok(mut event) = serde_json::from_str::<ClaudeStreamEvent>(data) else {
            return Vec::new();
        };
        if let ClaudeStreamEvent::MessageStart { message } = &mut event {
            if self.cache_creation_tokens > 0 {
                message.usage.cache_creation_input_tokens = Some(self.cache_creation_tokens);
            }
            if self.cache_read_tokens > 0 {
                message.usage.cache_read_input_tokens = Some(self.cache_read_tokens);
            }
        }
        vec![event]
    }
}

impl StreamAdapter for ClaudePassthroughAdapter {
    fn push(&mut self, chunk: &[u8]) -> Vec<ClaudeStreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(0..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).to_string();
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                out.extend(self.handle_data_line(data.trim()));
            }
        }
        out
    }

    fn finish(&mut self) -> Vec<ClaudeStreamEvent> {
        Vec::new()
    }

    /// Never consulted: the upstream's own `message_delta`/`message_stop`
    /// already passed through `push`, so the orchestrator skips synthesizing
    /// another pair for this adapter.
    fn stop_reason(&self) -> StopReason {
        StopReason::EndTurn
    }

    fn usage(&self) -> Option<Usage> {
        None
    }
}
