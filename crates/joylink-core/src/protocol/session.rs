//! Session management
//!
//! Handles the connection lifecycle and the read loop.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──opened──▶ Connected
//!      ▲                        │                    │   │
//!      └──── unsupported / ─────┘                    │   │
//!            aborted / open failure                  │   │
//!      ▲                                             │   │
//!      └──────────── end of stream / disconnect ─────┘   │
//!                                                        ▼
//!                                   Failed ◀── read or write failure,
//!                                              write abandoned on disconnect
//! ```
//!
//! There is no automatic reconnect; leaving `Disconnected` or `Failed`
//! always takes an explicit [`SerialSession::connect`].

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command::run_writer;
use super::{
    decode, CommandChannel, ConnectionState, ConnectionStatus, DeviceState, LineFramer,
    ProtocolError, SessionConfig, TransportProvider,
};

/// Tasks serving one open transport
struct ActiveLink {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ActiveLink {
    /// Stop both tasks and wait for them, releasing the transport
    ///
    /// The reader stops at once. A write in progress gets `drain` to finish,
    /// after which the writer is aborted. Returns `true` when a write was
    /// abandoned, in which case part of a line may be on the wire.
    async fn shutdown(mut self, drain: Duration) -> bool {
        self.cancel.cancel();
        if let Err(e) = self.reader.await {
            warn!("read task ended abnormally: {e}");
        }
        match tokio::time::timeout(drain, &mut self.writer).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!("write task ended abnormally: {e}");
                false
            }
            Err(_) => {
                warn!(?drain, "write still in progress, aborting writer");
                self.writer.abort();
                let _ = self.writer.await;
                true
            }
        }
    }
}

/// Exclusive hold on the transport's read half for one read loop.
/// Dropping it releases the half on every exit path, including unwinding.
struct ReadHandle<R> {
    inner: ReadHalf<R>,
}

impl<R: AsyncRead> ReadHandle<R> {
    fn acquire(inner: ReadHalf<R>) -> Self {
        debug!("read handle acquired");
        Self { inner }
    }

    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf).await
    }
}

impl<R> Drop for ReadHandle<R> {
    fn drop(&mut self) {
        debug!("read handle released");
    }
}

enum ReadExit {
    Cancelled,
    EndOfStream,
    Failed(std::io::Error),
}

/// A serial session with the peripheral
pub struct SerialSession<P: TransportProvider> {
    provider: P,
    config: SessionConfig,
    state: Arc<ConnectionState>,
    commands: CommandChannel,
    link: Mutex<Option<ActiveLink>>,
}

impl<P: TransportProvider> SerialSession<P> {
    /// Create a new session (not yet connected)
    pub fn new(provider: P, config: SessionConfig) -> Self {
        let state = Arc::new(ConnectionState::new());
        Self {
            provider,
            config,
            commands: CommandChannel::new(Arc::clone(&state)),
            state,
            link: Mutex::new(None),
        }
    }

    /// Shared state, for observers that poll
    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    /// Handle for sending commands. Clones share the same write path.
    pub fn commands(&self) -> CommandChannel {
        self.commands.clone()
    }

    /// Get current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    /// Latest device state
    pub fn snapshot(&self) -> DeviceState {
        self.state.snapshot()
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect to the device
    ///
    /// On any failure the session returns to `Disconnected` and the error is
    /// returned to the caller.
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        let mut link = self.link.lock().await;

        if matches!(
            self.state.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return Err(ProtocolError::AlreadyConnected);
        }

        // A link that ended by itself still has finished tasks to reap
        if let Some(stale) = link.take() {
            self.commands.detach();
            stale.shutdown(self.config.write_drain_timeout()).await;
        }

        self.config.validate()?;
        self.state.set_status(ConnectionStatus::Connecting);
        self.state.clear_error();

        match self.open_link().await {
            Ok(active) => {
                *link = Some(active);
                Ok(())
            }
            Err(e) => {
                warn!("connect failed: {e}");
                self.state.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    async fn open_link(&self) -> Result<ActiveLink, ProtocolError> {
        if !self.provider.is_supported() {
            return Err(ProtocolError::UnsupportedTransport);
        }

        let device = self.provider.request_device().await?;
        debug!(?device, "device selected");

        let port = self
            .provider
            .open(device, self.config.baud_rate)
            .await
            .map_err(|e| match e {
                ProtocolError::OpenFailure(_) => e,
                other => ProtocolError::OpenFailure(other.to_string()),
            })?;

        let (read_half, write_half) = tokio::io::split(port);
        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        self.commands.attach(queue_tx);
        // Connected before the tasks start, so an immediate EOF can still move us out of it
        self.state.set_status(ConnectionStatus::Connected);
        info!(baud_rate = self.config.baud_rate, "connected");

        let reader = tokio::spawn(run_reader(
            ReadHandle::acquire(read_half),
            LineFramer::with_max_line_len(self.config.max_line_len),
            Arc::clone(&self.state),
            cancel.clone(),
            self.config.read_chunk_size,
        ));
        let writer = tokio::spawn(run_writer(
            write_half,
            queue_rx,
            Arc::clone(&self.state),
            cancel.clone(),
        ));

        Ok(ActiveLink {
            cancel,
            reader,
            writer,
        })
    }

    /// Disconnect from the device
    ///
    /// Interrupts the read loop and waits for it to release the transport.
    /// Queued commands are dropped. A command already being written gets
    /// `write_drain_timeout_ms` to complete; if the device stops draining it
    /// is abandoned and the session ends in `Failed` with a write failure
    /// recorded, since a partial line may have reached the device.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        self.commands.detach();
        if let Some(active) = link.take() {
            if active.shutdown(self.config.write_drain_timeout()).await {
                let err = ProtocolError::WriteFailure("write abandoned during disconnect".into());
                error!("{err}");
                self.state.fail_link(&err);
                return;
            }
            info!("disconnected");
        }
        self.state.set_status(ConnectionStatus::Disconnected);
    }

    /// Wait until the current link ends by itself (end of stream or failure)
    ///
    /// Returns immediately when there is no link.
    pub async fn closed(&self) {
        let cancel = match self.link.lock().await.as_ref() {
            Some(active) => active.cancel.clone(),
            None => return,
        };
        cancel.cancelled().await;
    }
}

impl<P: TransportProvider> Drop for SerialSession<P> {
    fn drop(&mut self) {
        if let Some(active) = self.link.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

/// Pull chunks until cancelled, end of stream or a read error
async fn run_reader<R: AsyncRead>(
    mut reader: ReadHandle<R>,
    mut framer: LineFramer,
    state: Arc<ConnectionState>,
    cancel: CancellationToken,
    chunk_size: usize,
) {
    let mut buf = vec![0u8; chunk_size];

    let exit = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break ReadExit::Cancelled,

            res = reader.read(&mut buf) => match res {
                Ok(0) => break ReadExit::EndOfStream,
                Ok(n) => {
                    state.record_rx(n);
                    for line in framer.feed_bytes(&buf[..n]) {
                        let frame = decode(&line);
                        if !frame.is_recognized() {
                            debug!(line = %line, "dropping unrecognized line");
                        }
                        state.update_from_frame(&frame);
                    }
                }
                Err(e) => break ReadExit::Failed(e),
            },
        }
    };

    if !framer.pending().is_empty() {
        debug!(
            pending = framer.pending().len(),
            "discarding unterminated line"
        );
    }
    framer.reset();
    drop(reader);

    match exit {
        ReadExit::Cancelled => debug!("read loop cancelled"),
        ReadExit::EndOfStream => {
            info!("device closed the stream");
            state.transition(ConnectionStatus::Connected, ConnectionStatus::Disconnected);
            cancel.cancel();
        }
        ReadExit::Failed(e) => {
            let err = ProtocolError::ReadFailure(e.to_string());
            error!("{err}");
            state.fail_link(&err);
            cancel.cancel();
        }
    }
}
