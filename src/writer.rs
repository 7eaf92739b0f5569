//! Transmit worker: the only task that writes to the producer connection.
//!
//! Stream requests, buffer acks, flow-control settings and noop replies are
//! all queued on one channel and written in submission order, so the runtime
//! loop never blocks on a socket write while it waits for inbound data.
//!
//! # Architecture
//!
//! ```text
//! Feed (requests) ──┐
//! Runtime loop ─────┼─► mpsc::Sender<Frame> ─► Transmit worker ─► Socket
//! Handshake ────────┘                              ▲
//!                                     oneshot stop ┘
//! ```

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, UprError};
use crate::protocol::Frame;

/// Default outbound queue capacity. One slot: a submitter waits until the
/// worker has taken the previous frame.
pub const DEFAULT_TRANSMIT_CAPACITY: usize = 1;

/// Maximum frames coalesced into one write.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for queueing frames on the transmit worker.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct TransmitHandle {
    tx: mpsc::Sender<Frame>,
}

impl TransmitHandle {
    /// Queue a frame, waiting for room in the channel.
    ///
    /// Fails with [`UprError::TransmitClosed`] once the worker has stopped.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| UprError::TransmitClosed)
    }

    /// True once the worker has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner side of a running transmit worker.
pub struct TransmitWorker {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl TransmitWorker {
    /// Signal the worker to stop. Frames still queued are discarded.
    ///
    /// Returns the task handle so callers may wait for it.
    pub fn stop(self) -> JoinHandle<Result<()>> {
        let _ = self.stop.send(());
        self.task
    }
}

/// Spawn the transmit worker over the write half of a connection.
pub fn spawn_transmit_worker<W>(writer: W, capacity: usize) -> (TransmitHandle, TransmitWorker)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let (stop_tx, stop_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let result = transmit_loop(rx, writer, stop_rx).await;
        if let Err(e) = &result {
            tracing::error!("Transmit worker failed: {}", e);
        }
        result
    });

    (
        TransmitHandle { tx },
        TransmitWorker {
            stop: stop_tx,
            task,
        },
    )
}

/// Main worker loop.
///
/// Stops on the stop signal (or its sender being dropped), on channel close,
/// or on the first write error.
async fn transmit_loop<W>(
    mut rx: mpsc::Receiver<Frame>,
    mut writer: W,
    mut stop: oneshot::Receiver<()>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4 * 1024);

    loop {
        let first = tokio::select! {
            biased;
            _ = &mut stop => {
                tracing::debug!("Exiting transmit worker");
                return Ok(());
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => return Ok(()),
            },
        };

        let mut batch = 1;
        first.encode_into(&mut buf);
        while batch < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => {
                    frame.encode_into(&mut buf);
                    batch += 1;
                }
                Err(_) => break,
            }
        }

        tokio::select! {
            biased;
            _ = &mut stop => {
                tracing::debug!("Exiting transmit worker mid-write");
                return Ok(());
            }
            written = write_all(&mut writer, &buf) => written?,
        }
        tracing::trace!(frames = batch, bytes = buf.len(), "transmitted");
        buf.clear();
    }
}

/// Write and flush a fully encoded buffer.
pub(crate) async fn write_all<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}
