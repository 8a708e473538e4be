//! Remote process handle and byte-channel primitives
//!
//! Everything the relay and turn components need from a running remote
//! process: an input sink, chunked output/error sources, and an exit-wait
//! handle. The environment that spawns the process implements
//! [`ProcessLauncher`]; [`LocalLauncher`] runs commands on the host for tests
//! and the demo driver.

mod channel;
mod handle;
mod local;

pub use channel::{
    exit_channel, ByteSource, ChannelError, ChannelResult, ExitHandle, ExitStatus, InputSink,
};
pub use handle::{CommandSpec, LaunchError, LaunchResult, ProcessLauncher, RemoteProcess, TerminalSize};
pub use local::LocalLauncher;
