//! Sandbridge — terminal relay and turn-based messaging for remote processes.
//!
//! Drives interactive or turn-based programs running inside an isolated
//! execution environment over raw byte streams. Two components share the same
//! channel primitives:
//!
//! - [`relay::TerminalRelay`] attaches the local terminal to a remote
//!   shell-like process: raw-mode lifecycle, bidirectional forwarding, exit
//!   signaling, bounded teardown.
//! - [`turn::TurnChannel`] runs one request/response turn at a time over a
//!   newline-delimited JSON protocol, reassembling messages out of
//!   arbitrarily chunked byte streams and tracking the session identifier.
//!
//! The environment that actually creates and supervises the remote process is
//! a collaborator behind the [`process::ProcessLauncher`] trait;
//! [`process::LocalLauncher`] is a reference implementation that runs the
//! command on the host.

pub mod process;
pub mod relay;
pub mod turn;

pub use process::{
    exit_channel, ByteSource, ChannelError, CommandSpec, ExitHandle, ExitStatus, InputSink,
    LaunchError, LocalLauncher, ProcessLauncher, RemoteProcess, TerminalSize,
};
pub use relay::{RelayConfig, RelayError, TerminalRelay, TtyMode};
pub use turn::{FrameDecoder, MessageFrame, TurnChannel, TurnEnd, TurnError, TurnReply};
