//! Frame parsing and chunk reassembly
//!
//! Inbound frames are duck-typed JSON objects keyed on a `type` field.
//! Tolerant reader: unknown types are carried through untouched, malformed
//! lines are discarded, unknown fields are ignored.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors from parsing a single frame line
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// One structured message extracted from the byte stream.
///
/// Frames are ephemeral: consumed to update session state and to locate the
/// reply payload, then dropped with the turn.
#[derive(Debug, Clone)]
pub struct MessageFrame {
    raw: Value,
}

impl MessageFrame {
    /// Parse one newline-stripped line into a frame.
    pub fn parse(line: &str) -> Result<Self, FrameError> {
        let raw: Value = serde_json::from_str(line)?;
        if !raw.is_object() {
            return Err(FrameError::NotAnObject);
        }
        Ok(Self { raw })
    }

    /// The frame's `type` tag.
    pub fn kind(&self) -> &str {
        self.raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }

    /// Whether this frame ends the turn.
    pub fn is_result(&self) -> bool {
        self.kind() == "result"
    }

    /// Non-empty session identifier carried by the frame, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.raw
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Reply text of a `result` frame.
    pub fn result_text(&self) -> Option<&str> {
        self.raw.get("result").and_then(Value::as_str)
    }

    /// First non-empty text item in the frame's nested content list.
    ///
    /// Used as the reply fallback when no `result` frame arrived.
    pub fn first_text(&self) -> Option<&str> {
        let content = self.raw.get("message")?.get("content")?.as_array()?;
        content
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .find(|text| !text.is_empty())
    }
}

/// Reassembles newline-delimited frames out of arbitrarily chunked bytes.
///
/// The buffer is turn-scoped: [`FrameDecoder::clear`] runs at the start of
/// every turn and after a terminating frame, so no bytes leak across turns.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk of raw bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// Blank lines are skipped; malformed lines are logged and discarded,
    /// never fatal. Returns `None` once no complete line remains.
    pub fn next_frame(&mut self) -> Option<MessageFrame> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match MessageFrame::parse(text) {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    debug!("discarding malformed line: {}", e);
                }
            }
        }
        None
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Number of undigested bytes held between reads.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
