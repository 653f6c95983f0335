//! Pluggable approximate token estimator (§4.10/§9). This is deliberately
//! not bit-exact with any upstream's real tokenizer/billing; it only needs
//! to be stable and in the right ballpark for C5 sizing and C10 usage
//! records.

use relaymux_schema::claude::{ClaudeMessagesRequest, ClaudeTool};

use crate::config::CONFIG;

/// Rough chars-per-token ratio for BPE-style tokenizers across English and
/// code-heavy text.
const CHARS_PER_TOKEN: f64 = 3.8;

/// §4.10: some "small models" never get billed for input tokens by the
/// operator's configuration; record 0 for those rather than guess.
pub fn is_zero_input_token_model(model: &str) -> bool {
    CONFIG.zero_input_token_models.iter().any(|m| m == model)
}

/// Approximate input-token count over system + messages + tool
/// definitions, used by both the cache-size check (C5) and usage
/// recording (C10).
pub fn estimate_input_tokens(request: &ClaudeMessagesRequest) -> u32 {
    if is_zero_input_token_model(&request.model) {
        return 0;
    }
    let mut chars = request.estimator_text().chars().count();
    if let Some(tools) = &request.tools {
        chars += tools_text_len(tools);
    }
    estimate_tokens_for_chars(chars)
}

fn tools_text_len(tools: &[ClaudeTool]) -> usize {
    tools
        .iter()
        .map(|tool| {
            tool.name.chars().count()
                + tool.description.as_ref().map_or(0, |d| d.chars().count())
                + tool.input_schema.to_string().chars().count()
        })
        .sum()
}

/// Approximate output-token count, fed incrementally as text/tool-input
/// deltas stream through C8/C9.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputTokenCounter {
    chars: usize,
}

impl OutputTokenCounter {
    pub fn push(&mut self, text: &str) {
        self.chars += text.chars().count();
    }

    pub fn total(&self) -> u32 {
        estimate_tokens_for_chars(self.chars)
    }
}

fn estimate_tokens_for_chars(chars: usize) -> u32 {
    if chars == 0 {
        return 0;
    }
    ((chars as f64) / CHARS_PER_TOKEN).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymux_schema::claude::{ClaudeMessage, MessageContent, Role};

    fn request_with_text(text: &str) -> ClaudeMessagesRequest {
        ClaudeMessagesRequest {
            model: "claude-opus-4".into(),
            messages: vec![ClaudeMessage {
                role: Role::User,
                content: MessageContent::Text(text.to_string()),
            }],
            system: None,
            max_tokens: 100,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: Some(true),
            context_management: None,
            betas: None,
            anthropic_beta: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn empty_text_estimates_zero_tokens() {
        assert_eq!(estimate_tokens_for_chars(0), 0);
    }

    #[test]
    fn estimate_scales_with_text_length() {
        let short = estimate_input_tokens(&request_with_text("hi"));
        let long = estimate_input_tokens(&request_with_text(&"word ".repeat(200)));
        assert!(long > short);
    }

    #[test]
    fn output_counter_accumulates_across_pushes() {
        let mut counter = OutputTokenCounter::default();
        counter.push("hello ");
        counter.push("world");
        assert!(counter.total() > 0);
    }
}
