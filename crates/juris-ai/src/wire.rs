//! Line-delimited event frames exchanged between bridge and consumer
//!
//! Every non-empty line is either
//! `data: {"choices":[{"delta":{"content":"..."}}]}` or the literal
//! `data: [DONE]`. Decoding never fails: a body that is not JSON is handed
//! back as raw text so the consumer can show it verbatim.

use serde::{Deserialize, Serialize};

/// End-of-stream marker carried in the last frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// Prefix of every frame line
pub const DATA_PREFIX: &str = "data:";

/// Frame payload, shaped like a chat-completion delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatChunk {
    /// Build a chunk carrying a single text fragment
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(text.into()),
                },
            }],
        }
    }

    /// Text of the first choice, if any
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

/// Encode a text fragment as a frame (terminated by a blank line)
pub fn encode_delta(text: &str) -> String {
    // ChatChunk only holds strings, serialization cannot fail
    let json = serde_json::to_string(&ChatChunk::delta(text)).unwrap_or_default();
    format!("{DATA_PREFIX} {json}\n\n")
}

/// Encode the terminating frame
pub fn encode_done() -> String {
    format!("{DATA_PREFIX} {DONE_SENTINEL}\n\n")
}

/// One decoded line of the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A text fragment extracted from a JSON frame
    Delta(String),
    /// The `[DONE]` sentinel
    Done,
    /// A body that failed to parse as JSON, kept verbatim
    Raw(String),
    /// Blank line or a JSON frame without text
    Empty,
}

impl StreamFrame {
    /// Text this frame contributes to the message
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamFrame::Delta(t) | StreamFrame::Raw(t) => Some(t),
            StreamFrame::Done | StreamFrame::Empty => None,
        }
    }
}

/// Decode a single line (without its trailing `\n`)
pub fn decode_line(line: &str) -> StreamFrame {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return StreamFrame::Empty;
    }

    let body = match line.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    };

    if body.trim() == DONE_SENTINEL {
        return StreamFrame::Done;
    }

    match serde_json::from_str::<ChatChunk>(body) {
        Ok(chunk) => match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
            Some(text) => StreamFrame::Delta(text),
            None => StreamFrame::Empty,
        },
        Err(_) => StreamFrame::Raw(body.to_string()),
    }
}

/// Splits an incoming byte stream into complete lines.
///
/// Bytes are held until a `\n` arrives, so a multi-byte character split
/// across two reads is decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        if tail.trim().is_empty() { None } else { Some(tail) }
    }

    /// Number of buffered bytes not yet forming a line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
