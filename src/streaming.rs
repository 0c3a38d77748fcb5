//! Streaming Response Decoder
//!
//! Rebuilds a full answer from an OpenAI-style streamed completion:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hi"}}]}
//! data: {"choices":[{"delta":{"content":" there"}}]}
//! data: [DONE]
//! ```
//!
//! Transport chunks can split a record anywhere, including inside the
//! `data: ` prefix or inside a multi-byte character. Bytes are decoded
//! incrementally, complete lines are pulled out one at a time, and a
//! malformed line is skipped without aborting the stream. Whatever is left
//! without a trailing newline when the stream ends is dropped.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Incremental UTF-8 decoder and newline splitter.
///
/// Feed raw chunks with [`LineDecoder::feed`], then pull complete lines
/// with [`LineDecoder::next_line`].
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Undecoded bytes: an incomplete trailing UTF-8 sequence
    pending: Vec<u8>,
    /// Decoded text not yet returned as a line
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transport chunk
    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_end]));
                    match e.error_len() {
                        // Invalid sequence in the middle: substitute and move on
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    /// Next complete line, without its newline
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.find('\n')?;
        let line = self.buffer[..end].to_string();
        self.buffer.drain(..=end);
        Some(line)
    }

    /// Bytes and text held back waiting for a newline
    pub fn remainder_len(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }
}

/// Classification of one complete stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Content fragment to append
    Delta(String),
    /// Blank line, terminator, or an event without content
    Skip,
    /// Line that is not valid JSON
    Malformed,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a single line of the stream
pub fn parse_line(line: &str) -> StreamEvent {
    let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line).trim();
    if payload.is_empty() || payload == DONE_MARKER {
        return StreamEvent::Skip;
    }

    match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(StreamEvent::Delta)
            .unwrap_or(StreamEvent::Skip),
        Err(e) => {
            debug!("Skipping unparseable stream line: {}", e);
            StreamEvent::Malformed
        }
    }
}

/// Accumulates content deltas in arrival order
#[derive(Debug, Default)]
pub struct StreamDecoder {
    lines: LineDecoder,
    answer: String,
    deltas: usize,
    malformed: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one transport chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.lines.feed(chunk);
        while let Some(line) = self.lines.next_line() {
            match parse_line(&line) {
                StreamEvent::Delta(content) => {
                    self.answer.push_str(&content);
                    self.deltas += 1;
                }
                StreamEvent::Skip => {}
                StreamEvent::Malformed => self.malformed += 1,
            }
        }
    }

    /// Number of lines that failed to parse
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// End of stream: drop any unterminated tail and return the answer
    pub fn finish(self) -> String {
        let leftover = self.lines.remainder_len();
        if leftover > 0 {
            debug!("Dropping {} bytes of unterminated stream data", leftover);
        }
        debug!(
            "Stream complete: {} deltas, {} malformed lines, {} chars",
            self.deltas,
            self.malformed,
            self.answer.chars().count()
        );
        self.answer
    }

    /// Drive a byte stream to completion.
    ///
    /// Only an error from the stream itself aborts; bad lines never do.
    pub async fn consume<S, B, E>(stream: S) -> Result<String, E>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut decoder = Self::new();
        while let Some(chunk) = stream.next().await {
            decoder.push(chunk?.as_ref());
        }
        Ok(decoder.finish())
    }
}
