//! C7: Claude → upstream converters. One module per channel; each builds
//! the upstream request body from a `ClaudeMessagesRequest` plus the
//! target model selected by C6. Dispatched as a closed sum type (§9), never
//! via runtime reflection.

mod amazonq;
mod claude_passthrough;
mod gemini;
mod openai;

pub use amazonq::build_amazonq_request;
pub use claude_passthrough::{azure_cleanup, build_claude_passthrough_request};
pub use gemini::build_gemini_request;
pub use openai::build_openai_request;

use relaymux_schema::amazonq::AmazonQRequestBody;
use relaymux_schema::gemini::GeminiGenerateContentRequest;
use relaymux_schema::openai::OpenaiChatRequest;
use serde_json::Value;

/// The request body handed to one of the four upstreams, already in its
/// native wire shape.
pub enum UpstreamRequest {
    AmazonQ(Box<AmazonQRequestBody>),
    Gemini(Box<GeminiGenerateContentRequest>),
    Openai(Box<OpenaiChatRequest>),
    ClaudePassthrough(Box<Value>),
}

/// Directive threaded from the request/account into the thinking-enabled
/// converters: whether to inject a hint/`thinkingConfig`, and (for Gemini)
/// the reasoning budget.
#[derive(Debug, Clone, Copy)]
pub struct ThinkingDirective {
    pub enabled: bool,
    pub budget_tokens: u32,
}

impl ThinkingDirective {
    pub const DEFAULT_BUDGET: u32 = 1024;
}

pub const THINKING_HINT: &str =
    "Before answering, think step by step inside <thinking>...</thinking> tags, then give your final answer outside those tags.";
