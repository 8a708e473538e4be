//! One-turn-at-a-time message channel over a remote process
//!
//! Strictly sequential: send one user frame, read until a `result` frame,
//! stream end, or read timeout, then extract the reply. The session
//! identifier persists across turns and is overwritten by any frame that
//! carries one; the reassembly buffer does not persist.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::process::{ByteSource, ChannelError, InputSink, RemoteProcess};

use super::frame::{FrameDecoder, MessageFrame};

/// Per-chunk read deadline, measured from the last chunk received.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Session identifier used before the remote side assigns one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Errors that can occur during a turn
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for turn operations
pub type TurnResult<T> = Result<T, TurnError>;

/// Outbound user frame, serialized as one JSON object per line.
#[derive(Debug, Serialize)]
struct UserFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: UserMessage<'a>,
    session_id: &'a str,
    parent_tool_use_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Which terminator ended the read loop.
///
/// All three are normal completions; the caller distinguishes an empty reply
/// from transport failure by looking here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    /// A `result` frame arrived (the authoritative end-of-turn signal).
    Result,
    /// The output stream ended.
    StreamClosed,
    /// No chunk arrived within the read deadline.
    Timeout,
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// Extracted reply text; empty is a valid reply, not an error.
    pub text: String,
    /// How the read loop terminated.
    pub end: TurnEnd,
}

/// Sequential request/response channel over a remote process.
///
/// One instance serves one remote process for its entire lifetime; there is
/// no internal concurrency and at most one outstanding turn.
pub struct TurnChannel {
    stdin: InputSink,
    stdout: ByteSource,
    session_id: String,
    decoder: FrameDecoder,
    read_timeout: Duration,
}

impl TurnChannel {
    /// Build a channel by taking stdin and stdout from a remote process.
    pub fn new(process: &mut RemoteProcess) -> Result<Self, ChannelError> {
        Ok(Self::from_parts(process.stdin()?, process.stdout()?))
    }

    /// Build a channel from already-retrieved halves.
    pub fn from_parts(stdin: InputSink, stdout: ByteSource) -> Self {
        Self {
            stdin,
            stdout,
            session_id: DEFAULT_SESSION_ID.to_string(),
            decoder: FrameDecoder::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Override the per-chunk read deadline.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// The current session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run one turn: send a user message and collect the reply.
    pub async fn send(&mut self, prompt: &str) -> TurnResult<TurnReply> {
        // The buffer is turn-scoped; nothing from a previous turn survives.
        self.decoder.clear();

        let msg = UserFrame {
            kind: "user",
            message: UserMessage {
                role: "user",
                content: prompt,
            },
            session_id: &self.session_id,
            parent_tool_use_id: None,
        };
        let mut line = serde_json::to_string(&msg)?;
        line.push('\n');
        self.stdin.send(line.as_bytes()).await?;
        debug!(session = %self.session_id, "sent user message");

        let mut frames = Vec::new();
        let end = self.read_frames(&mut frames).await;
        let text = extract_reply(&frames);
        debug!(frames = frames.len(), end = ?end, "turn complete");
        Ok(TurnReply { text, end })
    }

    /// Read loop: pull chunks, drain complete frames, stop on a terminator.
    async fn read_frames(&mut self, frames: &mut Vec<MessageFrame>) -> TurnEnd {
        loop {
            let chunk = match timeout(self.read_timeout, self.stdout.next_chunk()).await {
                Err(_) => {
                    warn!(session = %self.session_id, "timed out waiting for response chunk");
                    return TurnEnd::Timeout;
                }
                Ok(None) => {
                    debug!("response stream ended");
                    return TurnEnd::StreamClosed;
                }
                Ok(Some(chunk)) => chunk,
            };

            self.decoder.push(&chunk);
            while let Some(frame) = self.decoder.next_frame() {
                debug!(kind = frame.kind(), "received frame");
                if let Some(id) = frame.session_id() {
                    self.session_id = id.to_string();
                }
                let terminal = frame.is_result();
                frames.push(frame);
                if terminal {
                    // Nothing may legitimately follow a result frame; bytes
                    // still buffered for this turn are dropped unparsed.
                    self.decoder.clear();
                    return TurnEnd::Result;
                }
            }
        }
    }

    /// Close the input sink. Remaining cleanup is the launcher's business.
    pub fn close(self) {
        self.stdin.close();
    }
}

/// Locate the reply text in the accumulated frames.
///
/// First `result` frame wins; otherwise the first non-empty text item inside
/// an `assistant` frame, in arrival order; otherwise empty.
fn extract_reply(frames: &[MessageFrame]) -> String {
    if let Some(result) = frames.iter().find(|f| f.is_result()) {
        return result.result_text().unwrap_or_default().to_string();
    }
    frames
        .iter()
        .filter(|f| f.kind() == "assistant")
        .find_map(MessageFrame::first_text)
        .map(str::to_string)
        .unwrap_or_default()
}
