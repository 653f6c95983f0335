pub mod amazonq;
pub mod claude;
pub mod gemini;
pub mod openai;

pub use amazonq::{AmazonQRequestBody, AmazonQStreamEvent};
pub use claude::{ClaudeMessagesRequest, ClaudeMessagesResponse, ClaudeStreamEvent};
pub use gemini::{GeminiGenerateContentRequest, GeminiResponseBody};
pub use openai::{OpenaiChatRequest, OpenaiChatResponse, OpenaiChatStreamChunk};
