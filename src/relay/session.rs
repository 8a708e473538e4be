//! Interactive relay session over a remote process
//!
//! Starts a shell-like command with a PTY sized to the local terminal and
//! runs four concurrent forwarding tasks until the process exits or the host
//! tears the session down: local input to remote stdin, remote stdout/stderr
//! to the local streams, and an exit watcher that fires the one-shot exit
//! signal. Remote exit always wins over a pending local read.

use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::process::{
    ByteSource, ChannelError, ChannelResult, CommandSpec, ExitHandle, InputSink, LaunchError,
    ProcessLauncher,
};

use super::terminal::{probe_size, RawModeGuard, TtyMode};

/// Bytes read from local input per iteration.
pub const INPUT_CHUNK_SIZE: usize = 1024;

/// How long teardown waits for the forwarding tasks before abandoning them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Errors that can occur while running a relay session
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("failed to enter raw mode: {0}")]
    RawMode(#[source] std::io::Error),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Configuration for a relay session
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Command to run remotely (e.g. a shell path)
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables for the remote process
    pub env: Vec<(String, String)>,
    /// Terminal I/O forwarding behavior
    pub tty: TtyMode,
}

impl RelayConfig {
    /// Create a config for the given command with auto-detected forwarding
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            tty: TtyMode::Auto,
        }
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

    /// Set the forwarding behavior
    pub fn tty_mode(mut self, tty: TtyMode) -> Self {
        self.tty = tty;
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

/// Interactive terminal session backed by a remote process.
///
/// Lifecycle: [`start`](Self::start) (idempotent), optionally
/// [`wait`](Self::wait), then [`shutdown`](Self::shutdown) on every exit
/// path. The raw-mode guard restores the local terminal exactly once even if
/// `shutdown` is never reached.
pub struct TerminalRelay<L> {
    launcher: L,
    config: RelayConfig,
    session_id: Uuid,
    started: bool,
    raw_mode: Option<RawModeGuard>,
    exited: Option<watch::Receiver<bool>>,
    tasks: Vec<JoinHandle<()>>,
    // Channels held for programmatic use when forwarding is disabled.
    stdin: Option<InputSink>,
    stdout: Option<ByteSource>,
    stderr: Option<ByteSource>,
}

impl<L: ProcessLauncher> TerminalRelay<L> {
    /// Create a relay over the given launcher. Nothing starts yet.
    pub fn new(launcher: L, config: RelayConfig) -> Self {
        Self {
            launcher,
            config,
            session_id: Uuid::new_v4(),
            started: false,
            raw_mode: None,
            exited: None,
            tasks: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Identifier used to correlate this session in logs.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Start the remote process and enter the session.
    ///
    /// Idempotent: calling on an already-started session is a no-op. All
    /// three channels and the exit handle are retrieved immediately, at most
    /// once. With forwarding enabled the local terminal goes raw and four
    /// tasks run; with it disabled only the exit watcher runs and the
    /// channels stay available through [`stdin`](Self::stdin) and friends.
    pub async fn start(&mut self) -> RelayResult<()> {
        if self.started {
            return Ok(());
        }

        let forward = self.config.tty.should_forward();
        let size = probe_size();
        let spec = CommandSpec::new(&self.config.command)
            .args(self.config.args.clone())
            .envs(self.config.env.clone())
            .with_pty(size);

        let mut process = self.launcher.start(spec).await?;
        let stdin = process.stdin()?;
        let stdout = process.stdout()?;
        let stderr = process.stderr()?;
        let exit = process.exit_handle()?;

        let (exited_tx, exited_rx) = watch::channel(false);

        if forward {
            self.raw_mode = Some(RawModeGuard::enable().map_err(RelayError::RawMode)?);
            self.tasks.push(tokio::spawn(forward_input(
                tokio::io::stdin(),
                stdin,
                exited_rx.clone(),
            )));
            self.tasks
                .push(tokio::spawn(forward_stream(stdout, tokio::io::stdout(), "stdout")));
            self.tasks
                .push(tokio::spawn(forward_stream(stderr, tokio::io::stderr(), "stderr")));
        } else {
            self.stdin = Some(stdin);
            self.stdout = Some(stdout);
            self.stderr = Some(stderr);
        }

        let session_id = self.session_id;
        self.tasks
            .push(tokio::spawn(watch_exit(exit, exited_tx, session_id)));

        self.exited = Some(exited_rx);
        self.started = true;
        info!(session = %self.session_id, command = %self.config.command, forwarding = forward,
            "relay session started");
        Ok(())
    }

    /// Take the remote input sink (only populated when forwarding is off).
    pub fn stdin(&mut self) -> ChannelResult<InputSink> {
        self.stdin.take().ok_or(ChannelError::AlreadyTaken("stdin"))
    }

    /// Take the remote output source (only populated when forwarding is off).
    pub fn stdout(&mut self) -> ChannelResult<ByteSource> {
        self.stdout
            .take()
            .ok_or(ChannelError::AlreadyTaken("stdout"))
    }

    /// Take the remote error source (only populated when forwarding is off).
    pub fn stderr(&mut self) -> ChannelResult<ByteSource> {
        self.stderr
            .take()
            .ok_or(ChannelError::AlreadyTaken("stderr"))
    }

    /// Block until the remote process has exited.
    pub async fn wait(&mut self) {
        if let Some(exited) = self.exited.as_mut() {
            // An error means the watcher is gone without signaling; either
            // way the session is over.
            let _ = exited.wait_for(|done| *done).await;
        }
    }

    /// Leave the session: restore the terminal, converge the task group
    /// within the grace period, then delegate to the launcher's cleanup.
    ///
    /// Safe on every exit path; terminal restoration happens first and never
    /// fails the teardown.
    pub async fn shutdown(&mut self) -> RelayResult<()> {
        if let Some(mut guard) = self.raw_mode.take() {
            guard.restore();
        }

        // Dropping the held channels closes remote stdin for non-forwarding
        // sessions that never used them.
        self.stdin = None;
        self.stdout = None;
        self.stderr = None;

        let tasks = std::mem::take(&mut self.tasks);
        if !tasks.is_empty() {
            match timeout(SHUTDOWN_GRACE, join_all(tasks)).await {
                Ok(_) => debug!(session = %self.session_id, "forwarding tasks finished"),
                Err(_) => warn!(
                    session = %self.session_id,
                    "forwarding tasks did not finish within grace period, abandoning"
                ),
            }
        }

        self.launcher.shutdown().await?;
        info!(session = %self.session_id, "relay session closed");
        Ok(())
    }
}

/// Forward local input to the remote stdin, racing each read against the
/// exit signal. Remote exit wins over a pending read; nothing is forwarded
/// after cancellation.
async fn forward_input<R>(mut local: R, sink: InputSink, mut exited: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; INPUT_CHUNK_SIZE];
    loop {
        tokio::select! {
            _ = async { exited.wait_for(|done| *done).await.map(|_| ()) } => {
                debug!("input forwarding stopped: remote process exited");
                break;
            }
            read = local.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("local input reached end of stream");
                    break;
                }
                Ok(n) => {
                    if let Err(e) = sink.send(&buf[..n]).await {
                        warn!("input forwarding stopped: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    warn!("local input read failed: {}", e);
                    break;
                }
            }
        }
    }
    sink.close();
}

/// Copy remote chunks to a local stream, flushing after every chunk so
/// interactive output shows up without buffering delay. Stream end is a
/// normal completion; failures are contained here.
async fn forward_stream<W>(mut source: ByteSource, mut dest: W, label: &'static str)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = source.next_chunk().await {
        if let Err(e) = dest.write_all(&chunk).await {
            warn!(stream = label, "write failed: {}", e);
            return;
        }
        if let Err(e) = dest.flush().await {
            warn!(stream = label, "flush failed: {}", e);
            return;
        }
    }
    debug!(stream = label, "remote stream ended");
}

/// Block on the remote exit and fire the one-shot exit signal.
async fn watch_exit(exit: ExitHandle, exited_tx: watch::Sender<bool>, session_id: Uuid) {
    let status = exit.wait().await;
    match &status.message {
        Some(message) => info!(session = %session_id, code = ?status.code, %message, "remote process exited"),
        None => info!(session = %session_id, code = ?status.code, "remote process exited"),
    }
    let _ = exited_tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{exit_channel, ExitStatus, RemoteProcess};
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    const WAIT: Duration = Duration::from_secs(2);

    /// Hands out a prebuilt process on the first start call.
    struct FakeLauncher {
        process: Mutex<Option<RemoteProcess>>,
        starts: AtomicUsize,
    }

    impl FakeLauncher {
        fn new(process: RemoteProcess) -> Self {
            Self {
                process: Mutex::new(Some(process)),
                starts: AtomicUsize::new(0),
            }
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn start(&self, _spec: CommandSpec) -> BoxFuture<'_, Result<RemoteProcess, LaunchError>> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let process = self.process.lock().unwrap().take();
            Box::pin(async move {
                process.ok_or_else(|| LaunchError::SpawnFailed("already started".into()))
            })
        }

        fn shutdown(&self) -> BoxFuture<'_, Result<(), LaunchError>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct Harness {
        relay: TerminalRelay<FakeLauncher>,
        exit_tx: tokio::sync::oneshot::Sender<ExitStatus>,
    }

    fn harness(tty: TtyMode) -> Harness {
        let (stdin, _stdin_rx) = InputSink::channel(8);
        let (_stdout_tx, stdout) = ByteSource::channel(8);
        let (exit_tx, exit) = exit_channel();
        let process = RemoteProcess::new(stdin, stdout, ByteSource::closed(), exit);
        let config = RelayConfig::new("/bin/sh").tty_mode(tty);
        Harness {
            relay: TerminalRelay::new(FakeLauncher::new(process), config),
            exit_tx,
        }
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let mut h = harness(TtyMode::Disabled);
        h.relay.start().await.unwrap();
        h.relay.start().await.unwrap();
        assert_eq!(h.relay.launcher.starts.load(Ordering::SeqCst), 1);
        drop(h.exit_tx);
    }

    #[tokio::test]
    async fn exit_signal_unblocks_wait_and_shutdown_converges() {
        let mut h = harness(TtyMode::Disabled);
        h.relay.start().await.unwrap();

        h.exit_tx.send(ExitStatus::with_code(0)).unwrap();
        timeout(WAIT, h.relay.wait()).await.unwrap();
        timeout(WAIT, h.relay.shutdown()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn disabled_mode_exposes_channels_exactly_once() {
        let mut h = harness(TtyMode::Disabled);
        h.relay.start().await.unwrap();

        assert!(h.relay.stdin().is_ok());
        assert!(matches!(
            h.relay.stdin().unwrap_err(),
            ChannelError::AlreadyTaken("stdin")
        ));
        assert!(h.relay.stdout().is_ok());
        assert!(h.relay.stderr().is_ok());
        drop(h.exit_tx);
    }

    #[tokio::test]
    async fn channels_are_unavailable_before_start() {
        let mut h = harness(TtyMode::Disabled);
        assert!(h.relay.stdin().is_err());
        drop(h.exit_tx);
    }

    #[tokio::test]
    async fn input_forwarder_yields_to_exit_signal() {
        // Local input that never produces data: a duplex with no writer
        // activity keeps the read pending forever.
        let (idle_writer, local) = tokio::io::duplex(64);
        let (sink, mut sink_rx) = InputSink::channel(8);
        let (exited_tx, exited_rx) = watch::channel(false);

        let task = tokio::spawn(forward_input(local, sink, exited_rx));

        // Give the forwarder time to block in the read, then signal exit.
        tokio::time::sleep(Duration::from_millis(50)).await;
        exited_tx.send(true).unwrap();

        timeout(SHUTDOWN_GRACE, task).await.unwrap().unwrap();
        assert!(sink_rx.recv().await.is_none(), "no data may follow cancellation");
        drop(idle_writer);
    }

    #[tokio::test]
    async fn input_forwarder_stops_on_local_eof() {
        let (writer, local) = tokio::io::duplex(64);
        let (sink, mut sink_rx) = InputSink::channel(8);
        let (_exited_tx, exited_rx) = watch::channel(false);

        let task = tokio::spawn(forward_input(local, sink, exited_rx));
        drop(writer);

        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(sink_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn input_forwarder_copies_chunks() {
        let (mut writer, local) = tokio::io::duplex(64);
        let (sink, mut sink_rx) = InputSink::channel(8);
        let (_exited_tx, exited_rx) = watch::channel(false);

        let task = tokio::spawn(forward_input(local, sink, exited_rx));
        writer.write_all(b"keys").await.unwrap();
        writer.flush().await.unwrap();

        let chunk = timeout(WAIT, sink_rx.recv()).await.unwrap().unwrap();
        assert_eq!(chunk, b"keys");

        drop(writer);
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn forward_stream_preserves_order_and_content() {
        let (feed, source) = ByteSource::channel(8);
        let (dest, mut readback) = tokio::io::duplex(1024);

        let task = tokio::spawn(forward_stream(source, dest, "stdout"));
        feed.send(b"first ".to_vec()).await.unwrap();
        feed.send(b"second".to_vec()).await.unwrap();
        drop(feed);

        timeout(WAIT, task).await.unwrap().unwrap();
        let mut out = Vec::new();
        readback.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"first second");
    }

    #[tokio::test]
    async fn watch_exit_fires_the_signal_once() {
        let (exit_tx, exit) = exit_channel();
        let (exited_tx, mut exited_rx) = watch::channel(false);

        let task = tokio::spawn(watch_exit(exit, exited_tx, Uuid::new_v4()));
        exit_tx.send(ExitStatus::with_code(7)).unwrap();

        timeout(WAIT, exited_rx.wait_for(|done| *done))
            .await
            .unwrap()
            .unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
    }
}
