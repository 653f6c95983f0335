//! C8: upstream → Claude stream adapters. Each upstream's native stream
//! shape is folded into the same `ClaudeStreamEvent` sequence (P-SSE); the
//! orchestrator (C9) only ever talks to the `StreamAdapter` trait, never to
//! a concrete upstream shape (§9: small shared interface, no reflection).

mod amazonq;
mod claude_passthrough;
mod gemini;
mod openai;

pub use amazonq::AmazonQAdapter;
pub use claude_passthrough::ClaudePassthroughAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenaiAdapter;

use relaymux_schema::claude::{ClaudeStreamEvent, StopReason, Usage};

/// Folds one upstream's raw byte stream into Claude SSE events. `push` is
/// fed whatever chunks the upstream connection yields (already framed per
/// the upstream's own transport, e.g. one SSE `data:` line or one decoded
/// event-stream frame); `finish` flushes anything buffered at stream end.
pub trait StreamAdapter {
    fn push(&mut self, chunk: &[u8]) -> Vec<ClaudeStreamEvent>;
    fn finish(&mut self) -> Vec<ClaudeStreamEvent>;
    /// The real stop reason observed from upstream, once `finish` has run.
    /// Channels with no upstream signal for this always report `EndTurn`.
    fn stop_reason(&self) -> StopReason;
    /// Real token usage reported by upstream, if this channel ever sent one.
    /// `None` means no usage metadata arrived, not that usage was zero.
    fn usage(&self) -> Option<Usage>;
}

/// Closed sum type over the four adapters (§9), dispatched once at stream
/// open rather than reflected on per-chunk.
pub enum Adapter {
    AmazonQ(AmazonQAdapter),
    Gemini(GeminiAdapter),
    Openai(OpenaiAdapter),
    ClaudePassthrough(ClaudePassthroughAdapter),
}

impl StreamAdapter for Adapter {
    fn push(&mut self, chunk: &[u8]) -> Vec<ClaudeStreamEvent> {
        match self {
            Adapter::AmazonQ(a) => a.push(chunk),
            Adapter::Gemini(a) => a.push(chunk),
            Adapter::Openai(a) => a.push(chunk),
            Adapter::ClaudePassthrough(a) => a.push(chunk),
        }
    }

    fn finish(&mut self) -> Vec<ClaudeStreamEvent> {
        match self {
            Adapter::AmazonQ(a) => a.finish(),
            Adapter::Gemini(a) => a.finish(),
            Adapter::Openai(a) => a.finish(),
            Adapter::ClaudePassthrough(a) => a.finish(),
        }
    }

    fn stop_reason(&self) -> StopReason {
        match self {
            Adapter::AmazonQ(a) => a.stop_reason(),
            Adapter::Gemini(a) => a.stop_reason(),
            Adapter::Openai(a) => a.stop_reason(),
            Adapter::ClaudePassthrough(a) => a.stop_reason(),
        }
    }

    fn usage(&self) -> Option<Usage> {
        match self {
            Adapter::AmazonQ(a) => a.usage(),
            Adapter::Gemini(a) => a.usage(),
            Adapter::Openai(a) => a.usage(),
            Adapter::ClaudePassthrough(a) => a.usage(),
        }
    }
}
