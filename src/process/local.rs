//! Reference launcher that runs commands on the host
//!
//! Exists so the relay and turn components can be exercised end-to-end
//! without a sandbox runtime behind them. Commands with a PTY request go
//! through portable-pty (stderr merges into the PTY stream, so the error
//! source is already closed); commands without one run as plain piped
//! children.

use std::io::{Read, Write};
use std::time::Duration;

use futures_util::future::BoxFuture;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::mpsc;
use tracing::debug;

use super::channel::{exit_channel, ByteSource, ExitStatus, InputSink};
use super::handle::{CommandSpec, LaunchError, LaunchResult, ProcessLauncher, RemoteProcess, TerminalSize};

/// Chunk size for the blocking PTY reader thread.
const PTY_READ_CHUNK: usize = 4096;

/// Launches commands directly on the host machine.
#[derive(Debug, Default)]
pub struct LocalLauncher;

impl LocalLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for LocalLauncher {
    fn start(&self, spec: CommandSpec) -> BoxFuture<'_, LaunchResult<RemoteProcess>> {
        Box::pin(async move {
            match spec.pty {
                Some(size) => spawn_pty(&spec, size),
                None => spawn_piped(&spec),
            }
        })
    }

    fn shutdown(&self) -> BoxFuture<'_, LaunchResult<()>> {
        // Nothing to tear down: process exit is observed through the handle.
        Box::pin(async { Ok(()) })
    }
}

fn to_pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Spawn a command under a pseudo-terminal.
///
/// Blocking PTY I/O is bridged onto channels by dedicated threads, the same
/// shape as any transport glue feeding a [`ByteSource`].
fn spawn_pty(spec: &CommandSpec, size: TerminalSize) -> LaunchResult<RemoteProcess> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(to_pty_size(size))
        .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;

    let mut cmd = CommandBuilder::new(&spec.command);
    cmd.args(&spec.args);
    if let Some(cwd) = &spec.cwd {
        cmd.cwd(cwd);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;
    drop(pair.slave);

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;

    let (chunk_tx, stdout) = ByteSource::channel(64);
    std::thread::spawn(move || reader_loop(reader, chunk_tx));

    let (stdin, mut input_rx) = InputSink::channel(64);
    std::thread::spawn(move || {
        while let Some(chunk) = input_rx.blocking_recv() {
            if writer.write_all(&chunk).and_then(|_| writer.flush()).is_err() {
                break;
            }
        }
    });

    // The master must outlive the child or the PTY closes underneath it.
    let master = pair.master;
    let (exit_tx, exit) = exit_channel();
    std::thread::spawn(move || {
        let status = match child.wait() {
            Ok(status) => ExitStatus::with_code(status.exit_code() as i32),
            Err(e) => ExitStatus::unknown(e.to_string()),
        };
        drop(master);
        let _ = exit_tx.send(status);
    });

    debug!(command = %spec.command, "spawned PTY process");
    Ok(RemoteProcess::new(stdin, stdout, ByteSource::closed(), exit))
}

fn reader_loop(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; PTY_READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => break,
        }
    }
}

/// Spawn a command with plain pipes, no terminal emulation.
fn spawn_piped(spec: &CommandSpec) -> LaunchResult<RemoteProcess> {
    let mut cmd = tokio::process::Command::new(&spec.command);
    cmd.args(&spec.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or(LaunchError::MissingStream("stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or(LaunchError::MissingStream("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(LaunchError::MissingStream("stderr"))?;

    let (exit_tx, exit) = exit_channel();
    tokio::spawn(async move {
        let status = match child.wait().await {
            Ok(status) => ExitStatus {
                code: status.code(),
                message: None,
            },
            Err(e) => ExitStatus::unknown(e.to_string()),
        };
        let _ = exit_tx.send(status);
    });

    debug!(command = %spec.command, "spawned piped process");
    Ok(RemoteProcess::new(
        InputSink::from_writer(stdin),
        ByteSource::from_reader(stdout),
        ByteSource::from_reader(stderr),
        exit,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn pty_process_produces_output() {
        let launcher = LocalLauncher::new();
        let spec = CommandSpec::new("echo")
            .arg("hello")
            .with_pty(TerminalSize::default());

        let mut proc = launcher.start(spec).await.unwrap();
        let mut stdout = proc.stdout().unwrap();

        let chunk = timeout(WAIT, stdout.next_chunk()).await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.contains("hello"));
    }

    #[tokio::test]
    async fn pty_exit_handle_resolves() {
        let launcher = LocalLauncher::new();
        let spec = CommandSpec::new("true").with_pty(TerminalSize::default());

        let mut proc = launcher.start(spec).await.unwrap();
        let exit = proc.exit_handle().unwrap();

        let status = timeout(WAIT, exit.wait()).await.unwrap();
        assert_eq!(status.code, Some(0));
    }

    #[tokio::test]
    async fn piped_cat_round_trip() {
        let launcher = LocalLauncher::new();
        let mut proc = launcher.start(CommandSpec::new("cat")).await.unwrap();

        let stdin = proc.stdin().unwrap();
        let mut stdout = proc.stdout().unwrap();
        let exit = proc.exit_handle().unwrap();

        stdin.send(b"round trip\n").await.unwrap();
        let chunk = timeout(WAIT, stdout.next_chunk()).await.unwrap().unwrap();
        assert_eq!(chunk, b"round trip\n");

        stdin.close();
        let status = timeout(WAIT, exit.wait()).await.unwrap();
        assert_eq!(status.code, Some(0));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let launcher = LocalLauncher::new();
        let result = launcher
            .start(CommandSpec::new("/nonexistent/binary/for/test"))
            .await;
        assert!(result.is_err());
    }
}
