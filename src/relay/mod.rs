//! Terminal relay engine
//!
//! Presents an interactive terminal session backed by a remote process:
//! raw-mode lifecycle for the local terminal, four concurrent forwarding
//! tasks, exit signaling, and bounded teardown.

mod session;
mod terminal;

pub use session::{RelayConfig, RelayError, RelayResult, TerminalRelay, INPUT_CHUNK_SIZE, SHUTDOWN_GRACE};
pub use terminal::{probe_size, RawModeGuard, TtyMode};
