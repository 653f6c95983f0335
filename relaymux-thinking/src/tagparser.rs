//! Streaming parser for `<thinking>...</thinking>` sections embedded in plain
//! text chunks (used by the Amazon Q and OpenAI-compatible stream adapters,
//! which have no native thinking-block framing and instead get reasoning
//! text inline with the answer).
//!
//! Chunk boundaries are arbitrary: a chunk may split a tag ("...`<thin`" /
//! "`king>`...") or a UTF-8 multi-byte sequence. The parser buffers whatever
//! it cannot yet decide about and only emits events once they are
//! unambiguous.

const OPEN_TAG: &[u8] = b"<thinking>";
const CLOSE_TAG: &[u8] = b"</thinking>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Outside,
    Thinking,
}

/// One unit of parsed output. `Text`/`ThinkingDelta` carry owned strings
/// since the parser buffers across `push` calls and cannot borrow from a
/// caller-owned chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEvent {
    Text(String),
    ThinkingDelta(String),
    ThinkingStart,
    ThinkingEnd,
}

#[derive(Debug, Default)]
pub struct ThinkingTagParser {
    mode: ModeState,
    pending: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModeState(Mode);

impl Default for ModeState {
    fn default() -> Self {
        ModeState(Mode::Outside)
    }
}

impl ThinkingTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the parser is currently inside an opened, unclosed thinking block.
    pub fn in_thinking(&self) -> bool {
        self.mode.0 == Mode::Thinking
    }

    /// Feed the next chunk of upstream text and get back the events it
    /// unambiguously resolves. Bytes that might still be part of a tag, or
    /// an incomplete UTF-8 sequence, are held in an internal buffer.
    pub fn push(&mut self, chunk: &str) -> Vec<TagEvent> {
        self.pending.extend_from_slice(chunk.as_bytes());
        let mut events = Vec::new();

        loop {
            let tag = match self.mode.0 {
                Mode::Outside => OPEN_TAG,
                Mode::Thinking => CLOSE_TAG,
            };

            if let Some(idx) = find_subslice(&self.pending, tag) {
                let before = &self.pending[..idx];
                if !before.is_empty() {
                    events.push(self.wrap_text(String::from_utf8_lossy(before).into_owned()));
                }
                events.push(match self.mode.0 {
                    Mode::Outside => TagEvent::ThinkingStart,
                    Mode::Thinking => TagEvent::ThinkingEnd,
                });
                self.pending.drain(..idx + tag.len());
                self.mode.0 = match self.mode.0 {
                    Mode::Outside => Mode::Thinking,
                    Mode::Thinking => Mode::Outside,
                };
                continue;
            }

            let hold = longest_tag_prefix_suffix(&self.pending, tag)
                .max(incomplete_utf8_tail_len(&self.pending));
            let split_at = self.pending.len() - hold;
            if split_at > 0 {
                let text = String::from_utf8_lossy(&self.pending[..split_at]).into_owned();
                if !text.is_empty() {
                    events.push(self.wrap_text(text));
                }
                self.pending.drain(..split_at);
            }
            break;
        }

        events
    }

    /// Flush whatever remains in the buffer at end-of-stream. An unterminated
    /// `<thinking>` block is flushed as a final `ThinkingDelta` (callers are
    /// responsible for still closing the content block in the Claude event
    /// sequence).
    pub fn finish(mut self) -> Vec<TagEvent> {
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            if !text.is_empty() {
                events.push(self.wrap_text(text));
            }
        }
        events
    }

    fn wrap_text(&self, text: String) -> TagEvent {
        match self.mode.0 {
            Mode::Outside => TagEvent::Text(text),
            Mode::Thinking => TagEvent::ThinkingDelta(text),
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Longest suffix of `data` that is a (strict, non-matching) prefix of `tag`.
/// Used to decide how many trailing bytes might still grow into a full tag
/// match once more chunks arrive.
fn longest_tag_prefix_suffix(data: &[u8], tag: &[u8]) -> usize {
    let max_k = tag.len().saturating_sub(1).min(data.len());
    for k in (1..=max_k).rev() {
        if data[data.len() - k..] == tag[..k] {
            return k;
        }
    }
    0
}

/// Length of a trailing, not-yet-complete UTF-8 multi-byte sequence, if any.
fn incomplete_utf8_tail_len(data: &[u8]) -> usize {
    let len = data.len();
    for back in 1..=3.min(len) {
        let b = data[len - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            // continuation byte; keep walking back to find the lead byte
            continue;
        }
        if b & 0b1000_0000 == 0 {
            return 0; // ASCII, always complete
        }
        let needed = if b & 0b1110_0000 == 0b1100_0000 {
            2
        } else if b & 0b1111_0000 == 0b1110_0000 {
            3
        } else if b & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            return 0; // not a valid lead byte; leave to from_utf8_lossy
        };
        return if back < needed { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&str]) -> Vec<TagEvent> {
        let mut parser = ThinkingTagParser::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(parser.push(chunk));
        }
        events.extend(parser.finish());
        events
    }

    #[test]
    fn plain_text_has_no_thinking_events() {
        let events = collect(&["hello ", "world"]);
        assert_eq!(
            events,
            vec![TagEvent::Text("hello ".into()), TagEvent::Text("world".into())]
        );
    }

    #[test]
    fn well_formed_thinking_block_single_chunk() {
        let events = collect(&["before<thinking>reasoning</thinking>after"]);
        assert_eq!(
            events,
            vec![
                TagEvent::Text("before".into()),
                TagEvent::ThinkingStart,
                TagEvent::ThinkingDelta("reasoning".into()),
                TagEvent::ThinkingEnd,
                TagEvent::Text("after".into()),
            ]
        );
    }

    #[test]
    fn tag_split_across_chunk_boundaries_matches_single_chunk_result() {
        let chunked = collect(&["before<thin", "king>reaso", "ning</th", "inking>after"]);
        let whole = collect(&["before<thinking>reasoning</thinking>after"]);
        assert_eq!(chunked, whole);
    }

    #[test]
    fn multibyte_char_split_across_chunks_is_not_corrupted() {
        // "café" - é is 2 bytes in UTF-8; split right in the middle of it.
        let s = "café".as_bytes();
        let mid = s.len() - 1;
        let first = std::str::from_utf8(&s[..mid]).unwrap_or("caf");
        let events = collect(&[first, std::str::from_utf8(&s[mid..]).unwrap_or("\u{0}")]);
        let joined: String = events
            .into_iter()
            .map(|e| match e {
                TagEvent::Text(t) | TagEvent::ThinkingDelta(t) => t,
                _ => String::new(),
            })
            .collect();
        assert_eq!(joined, "café");
    }

    #[test]
    fn unterminated_thinking_block_is_flushed_on_finish() {
        let events = collect(&["<thinking>partial reasoning"]);
        assert_eq!(
            events,
            vec![
                TagEvent::ThinkingStart,
                TagEvent::ThinkingDelta("partial reasoning".into()),
            ]
        );
    }
}
