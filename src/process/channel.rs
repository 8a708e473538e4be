//! Byte-channel primitives for talking to a remote process
//!
//! The transport underneath (vsock, pipe, PTY) is glue the runtime layer
//! provides; here a write channel is an mpsc sender of byte chunks and a read
//! channel is the matching receiver. Helper constructors adapt any
//! `AsyncRead`/`AsyncWrite` into these shapes by spawning a pump task.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Chunk size used by the reader pump tasks.
const PUMP_CHUNK_SIZE: usize = 4096;

/// Default capacity for channel-backed sinks and sources.
const CHANNEL_CAPACITY: usize = 64;

/// Errors from channel operations
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{0} channel is closed")]
    Closed(&'static str),

    #[error("{0} channel was already retrieved")]
    AlreadyTaken(&'static str),
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Write channel into a remote process (its stdin).
///
/// Retrieved at most once from a [`super::RemoteProcess`]. Dropping the sink
/// (or calling [`InputSink::close`]) closes the remote end.
#[derive(Debug)]
pub struct InputSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl InputSink {
    /// Create a raw sink/receiver pair for transport glue to consume.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Adapt an async writer into a sink.
    ///
    /// A pump task writes and flushes each chunk; a write failure is logged
    /// and ends the pump. The writer is shut down when the sink closes.
    pub fn from_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, mut rx) = Self::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(chunk) = rx.recv().await {
                if let Err(e) = writer.write_all(&chunk).await {
                    warn!("input write failed: {}", e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    warn!("input flush failed: {}", e);
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });
        sink
    }

    /// Send one chunk of bytes to the remote process.
    pub async fn send(&self, data: &[u8]) -> ChannelResult<()> {
        self.tx
            .send(data.to_vec())
            .await
            .map_err(|_| ChannelError::Closed("input"))
    }

    /// Close the channel. The transport drains queued chunks and shuts down.
    pub fn close(self) {
        debug!("input sink closed");
    }
}

/// Lazy sequence of byte chunks out of a remote process (stdout or stderr).
///
/// Chunk boundaries are transport-determined and carry no meaning.
#[derive(Debug)]
pub struct ByteSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ByteSource {
    /// Create a feeder/source pair for transport glue to fill.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Adapt an async reader into a chunk source.
    ///
    /// A pump task reads up to 4096 bytes at a time. Read errors are treated
    /// as end of stream: logged, then the source closes.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, source) = Self::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut reader = reader;
            let mut buf = vec![0u8; PUMP_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("read error treated as end of stream: {}", e);
                        break;
                    }
                }
            }
        });
        source
    }

    /// A source that has already ended. Used where a stream does not exist,
    /// e.g. stderr of a PTY process (merged into stdout by the terminal).
    pub fn closed() -> Self {
        let (_tx, source) = Self::channel(1);
        source
    }

    /// Next chunk, or `None` once the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// How a remote process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process ran to completion.
    pub code: Option<i32>,
    /// Diagnostic message when the exit could not be observed cleanly.
    pub message: Option<String>,
}

impl ExitStatus {
    /// Status for a process that exited with a code.
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            message: None,
        }
    }

    /// Status for an exit that could not be observed.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: Some(message.into()),
        }
    }
}

/// One-shot exit-wait handle for a remote process.
#[derive(Debug)]
pub struct ExitHandle {
    rx: oneshot::Receiver<ExitStatus>,
}

impl ExitHandle {
    /// Wait for the process to exit.
    ///
    /// Never fails: if the reporting side is dropped without sending, the
    /// exit is reported as unknown with a diagnostic message.
    pub async fn wait(self) -> ExitStatus {
        self.rx
            .await
            .unwrap_or_else(|_| ExitStatus::unknown("exit reporter dropped before process exit"))
    }
}

/// Create a reporter/handle pair for exit signaling.
pub fn exit_channel() -> (oneshot::Sender<ExitStatus>, ExitHandle) {
    let (tx, rx) = oneshot::channel();
    (tx, ExitHandle { rx })
}
