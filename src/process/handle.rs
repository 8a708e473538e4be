//! Remote process handle and the launcher seam
//!
//! A [`RemoteProcess`] bundles the three byte channels and the exit-wait
//! handle for one running command. Each channel is retrievable exactly once;
//! a second retrieval is a usage bug and fails with
//! [`ChannelError::AlreadyTaken`] rather than handing out a shared reference.

use std::path::PathBuf;

use futures_util::future::BoxFuture;
use thiserror::Error;

use super::channel::{ByteSource, ChannelError, ChannelResult, ExitHandle, InputSink};

/// Errors that can occur while starting or stopping a remote process
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spawned process is missing its {0} stream")]
    MissingStream(&'static str),
}

/// Result type for launcher operations
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Terminal dimensions for PTY allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// Description of a command to start inside the execution environment
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// Program to run
    pub command: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Environment variables passed to the process
    pub env: Vec<(String, String)>,
    /// Working directory, if any
    pub cwd: Option<PathBuf>,
    /// Allocate a pseudo-terminal with these dimensions
    pub pty: Option<TerminalSize>,
}

impl CommandSpec {
    /// Create a spec for the given command
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add environment variables
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Request a pseudo-terminal with the given dimensions
    pub fn with_pty(mut self, size: TerminalSize) -> Self {
        self.pty = Some(size);
        self
    }
}

/// Handle to a command running inside the execution environment.
///
/// Owned exclusively by whichever component started the process. The channels
/// are held as options so that each can be taken exactly once.
pub struct RemoteProcess {
    stdin: Option<InputSink>,
    stdout: Option<ByteSource>,
    stderr: Option<ByteSource>,
    exit: Option<ExitHandle>,
}

impl RemoteProcess {
    /// Assemble a handle from its channels. Called by launcher implementations.
    pub fn new(stdin: InputSink, stdout: ByteSource, stderr: ByteSource, exit: ExitHandle) -> Self {
        Self {
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit: Some(exit),
        }
    }

    /// Take the input sink. Fails on the second call.
    pub fn stdin(&mut self) -> ChannelResult<InputSink> {
        self.stdin.take().ok_or(ChannelError::AlreadyTaken("stdin"))
    }

    /// Take the output source. Fails on the second call.
    pub fn stdout(&mut self) -> ChannelResult<ByteSource> {
        self.stdout
            .take()
            .ok_or(ChannelError::AlreadyTaken("stdout"))
    }

    /// Take the error source. Fails on the second call.
    pub fn stderr(&mut self) -> ChannelResult<ByteSource> {
        self.stderr
            .take()
            .ok_or(ChannelError::AlreadyTaken("stderr"))
    }

    /// Take the exit-wait handle. Fails on the second call.
    pub fn exit_handle(&mut self) -> ChannelResult<ExitHandle> {
        self.exit.take().ok_or(ChannelError::AlreadyTaken("exit"))
    }
}

/// The external collaborator that creates and supervises remote processes.
///
/// Implementations cover whatever isolation layer is in use (microVM,
/// container, plain host process). This crate only consumes the byte streams
/// a started process exposes; provisioning is the implementor's business.
pub trait ProcessLauncher: Send + Sync {
    /// Start a command and hand back its channels.
    fn start(&self, spec: CommandSpec) -> BoxFuture<'_, LaunchResult<RemoteProcess>>;

    /// Stop/cleanup hook invoked when the driving component tears down.
    fn shutdown(&self) -> BoxFuture<'_, LaunchResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::channel::exit_channel;

    fn process() -> RemoteProcess {
        let (stdin, _rx) = InputSink::channel(1);
        let (_tx, stdout) = ByteSource::channel(1);
        let (_exit_tx, exit) = exit_channel();
        RemoteProcess::new(stdin, stdout, ByteSource::closed(), exit)
    }

    #[test]
    fn channels_are_retrievable_exactly_once() {
        let mut proc = process();
        assert!(proc.stdin().is_ok());
        assert!(matches!(
            proc.stdin().unwrap_err(),
            ChannelError::AlreadyTaken("stdin")
        ));

        assert!(proc.stdout().is_ok());
        assert!(matches!(
            proc.stdout().unwrap_err(),
            ChannelError::AlreadyTaken("stdout")
        ));

        assert!(proc.stderr().is_ok());
        assert!(proc.stderr().is_err());

        assert!(proc.exit_handle().is_ok());
        assert!(matches!(
            proc.exit_handle().unwrap_err(),
            ChannelError::AlreadyTaken("exit")
        ));
    }

    #[test]
    fn command_spec_builder() {
        let spec = CommandSpec::new("/bin/sh")
            .arg("-c")
            .arg("echo hi")
            .env("TERM", "xterm-256color")
            .current_dir("/tmp")
            .with_pty(TerminalSize::new(120, 40));

        assert_eq!(spec.command, "/bin/sh");
        assert_eq!(spec.args, vec!["-c".to_string(), "echo hi".to_string()]);
        assert_eq!(spec.env.len(), 1);
        assert_eq!(spec.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(spec.pty, Some(TerminalSize::new(120, 40)));
    }

    #[test]
    fn terminal_size_default() {
        let size = TerminalSize::default();
        assert_eq!(size.cols, 80);
        assert_eq!(size.rows, 24);
    }
}
