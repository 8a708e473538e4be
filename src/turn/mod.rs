//! Turn-based message channel
//!
//! One logical request/response turn over a remote process speaking one JSON
//! object per line in both directions. The transport delivers bytes in
//! arbitrary chunks, so [`FrameDecoder`] reassembles complete lines before
//! [`TurnChannel`] classifies and accumulates the frames.

mod channel;
mod frame;

pub use channel::{
    TurnChannel, TurnEnd, TurnError, TurnReply, TurnResult, DEFAULT_READ_TIMEOUT,
    DEFAULT_SESSION_ID,
};
pub use frame::{FrameDecoder, FrameError, MessageFrame};
