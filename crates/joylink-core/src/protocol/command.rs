//! Outbound command path
//!
//! Any number of callers may send commands concurrently. Every command goes
//! through one queue drained by a single writer task that owns the write half
//! of the transport, so encoded lines are written whole and in call order.
//! The queue is unbounded: a burst of sends is never thinned out while the
//! link is up.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::{encode, ConnectionState, ConnectionStatus, OutboundCommand, ProtocolError};

type Ack = oneshot::Sender<Result<(), ProtocolError>>;

/// A queued command, optionally with a completion reply
pub(crate) struct WriteRequest {
    command: OutboundCommand,
    ack: Option<Ack>,
}

/// Cloneable handle for sending commands to the device
#[derive(Clone)]
pub struct CommandChannel {
    state: Arc<ConnectionState>,
    queue: Arc<Mutex<Option<mpsc::UnboundedSender<WriteRequest>>>>,
}

impl CommandChannel {
    pub(crate) fn new(state: Arc<ConnectionState>) -> Self {
        Self {
            state,
            queue: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue a command for writing
    ///
    /// Silently does nothing unless the session is connected. Never blocks
    /// and never drops a command while the writer is running.
    pub fn send(&self, command: OutboundCommand) {
        if self.state.status() != ConnectionStatus::Connected {
            trace!(%command, "not connected, command ignored");
            return;
        }
        let Some(queue) = self.sender() else {
            return;
        };

        if queue.send(WriteRequest { command, ack: None }).is_err() {
            trace!(%command, "writer stopped, command ignored");
        }
    }

    /// Queue a command and wait until it has been written
    ///
    /// Returns `NotConnected` if the command was never written and
    /// `WriteFailure` if the write itself failed.
    pub async fn send_acked(&self, command: OutboundCommand) -> Result<(), ProtocolError> {
        if self.state.status() != ConnectionStatus::Connected {
            return Err(ProtocolError::NotConnected);
        }
        let queue = self.sender().ok_or(ProtocolError::NotConnected)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        queue
            .send(WriteRequest {
                command,
                ack: Some(ack_tx),
            })
            .map_err(|_| ProtocolError::NotConnected)?;

        ack_rx.await.unwrap_or(Err(ProtocolError::NotConnected))
    }

    pub(crate) fn attach(&self, queue: mpsc::UnboundedSender<WriteRequest>) {
        *self.queue.lock().unwrap_or_else(PoisonError::into_inner) = Some(queue);
    }

    pub(crate) fn detach(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<WriteRequest>> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn write_line<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Drain the command queue onto the write half until cancelled or failed
///
/// Cancellation is only observed between commands. A write that has started
/// runs until it completes or the task is aborted by a bounded disconnect.
pub(crate) async fn run_writer<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<WriteRequest>,
    state: Arc<ConnectionState>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let request = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            req = queue.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        let bytes = encode(&request.command);
        match write_line(&mut writer, &bytes).await {
            Ok(()) => {
                state.record_tx(bytes.len());
                trace!(command = %request.command, "command written");
                if let Some(ack) = request.ack {
                    let _ = ack.send(Ok(()));
                }
            }
            Err(e) => {
                let err = ProtocolError::WriteFailure(e.to_string());
                error!(command = %request.command, "{err}");
                state.fail_link(&err);
                if let Some(ack) = request.ack {
                    let _ = ack.send(Err(err));
                }
                cancel.cancel();
                break;
            }
        }
    }

    // Anything still queued was never attempted; dropping the acks reports NotConnected
    queue.close();
    debug!("command writer stopped");
}
