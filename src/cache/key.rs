//! C5 cache key (§4.5): SHA-256 of the cacheable prefix — system text plus
//! every content block explicitly marked `cache_control: ephemeral`, in
//! message order, plus tool definitions when they appear before the last
//! such marker.

use relaymux_schema::claude::{ClaudeMessagesRequest, ContentBlock};
use sha2::{Digest, Sha256};

pub type CacheKey = [u8; 32];

pub fn cache_key(request: &ClaudeMessagesRequest) -> Option<CacheKey> {
    let mut segments: Vec<String> = Vec::new();
    let mut last_marked_index: Option<usize> = None;

    if let Some(system) = &request.system {
        for block in system.as_blocks() {
            if block.cache_control().is_some() {
                push_block_text(&mut segments, &block);
                last_marked_index = Some(segments.len() - 1);
            }
        }
    }

    for message in &request.messages {
        for block in message.content.as_blocks() {
            if block.cache_control().is_some() {
                push_block_text(&mut segments, &block);
                last_marked_index = Some(segments.len() - 1);
            }
        }
    }

    last_marked_index?;

    if let Some(tools) = &request.tools {
        let tools_json = serde_json::to_string(tools).ok()?;
        segments.push(tools_json);
    }

    let mut hasher = Sha256::new();
    for segment in &segments {
        hasher.update(segment.as_bytes());
        hasher.update(b"\0");
    }
    Some(hasher.finalize().into())
}

fn push_block_text(segments: &mut Vec<String>, block: &ContentBlock) {
    match block {
        ContentBlock::Text { text, .. } => segments.push(text.clone()),
        ContentBlock::Image { source, .. } => segments.push(source.data.clone()),
        ContentBlock::ToolUse { input, .. } => {
            segments.push(input.to_string());
        }
        ContentBlock::ToolResult { content, .. } => {
            if let Some(content) = content {
                segments.push(content.flatten_text());
            }
        }
        ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. } | ContentBlock::Unknown => {}
    }
}

pub fn hex(key: &CacheKey) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}
