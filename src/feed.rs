//! Feed builder, pre-start operations and the running feed handle.
//!
//! The [`FeedBuilder`] collects settings and opens the session. The
//! resulting [`Feed`] manages the lifecycle:
//! 1. Split the connection and send Open
//! 2. Spawn the transmit worker
//! 3. Negotiate the flow-control window
//! 4. Fetch failover logs and request streams
//! 5. `start()` hands the read half to the runtime loop
//!
//! # Example
//!
//! ```no_run
//! use upr_client::{FeedBuilder, StreamRequest};
//!
//! # async fn run() -> upr_client::Result<()> {
//! let mut feed = FeedBuilder::new()
//!     .name("indexer")
//!     .buffer_size(20 * 1024 * 1024)
//!     .connect("127.0.0.1:11210")
//!     .await?;
//!
//! let logs = feed.get_failover_logs(&[0]).await?;
//! let epoch = logs[&0].latest()?.epoch;
//! feed.request_stream(StreamRequest::new(0, epoch, 0, u64::MAX)).await?;
//!
//! let mut handle = feed.start();
//! while let Some(event) = handle.recv().await {
//!     println!("{} partition={} seqno={}", event, event.partition, event.seqno);
//! }
//! let stats = handle.wait().await?;
//! println!("{} events", stats.events);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::FeedConfig;
use crate::error::{Result, UprError};
use crate::event::{Event, FailoverLog};
use crate::handshake;
use crate::observer::{FeedObserver, FeedStats, NoopObserver};
use crate::runtime::{FeedRuntime, RuntimeExit};
use crate::stream::{StreamRegistry, StreamRequest};
use crate::transport::{self, FrameReader};
use crate::writer::{spawn_transmit_worker, TransmitHandle, TransmitWorker};

/// Builder for configuring and opening a feed.
pub struct FeedBuilder {
    config: FeedConfig,
    observer: Arc<dyn FeedObserver>,
}

impl FeedBuilder {
    pub fn new() -> Self {
        Self::from_config(FeedConfig::default())
    }

    /// Start from a loaded config.
    pub fn from_config(config: FeedConfig) -> Self {
        Self {
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Connection name sent with Open.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sequence number sent with Open.
    pub fn sequence(mut self, sequence: u32) -> Self {
        self.config.sequence = sequence;
        self
    }

    /// Flow-control window in bytes.
    ///
    /// Default: 0 (not negotiated)
    pub fn buffer_size(mut self, bytes: u32) -> Self {
        self.config.buffer_size = bytes;
        self
    }

    /// Capacity of the event queue.
    ///
    /// Default: 1
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Capacity of the outbound frame queue.
    ///
    /// Default: 1
    pub fn transmit_capacity(mut self, capacity: usize) -> Self {
        self.config.transmit_capacity = capacity;
        self
    }

    /// Largest frame body accepted from the producer.
    pub fn max_body_size(mut self, bytes: u32) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    pub fn observer(mut self, observer: impl FeedObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Open a session over an established connection.
    ///
    /// The feed takes ownership of the connection; nothing else may read
    /// from or write to it afterwards.
    pub async fn open<S>(self, stream: S) -> Result<Feed<S>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Feed::open(stream, self.config, self.observer).await
    }

    /// Connect over TCP and open a session.
    pub async fn connect<A: ToSocketAddrs>(self, addr: A) -> Result<Feed<TcpStream>> {
        self.config.validate()?;
        let stream = transport::connect(addr).await?;
        self.open(stream).await
    }
}

impl Default for FeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An open UPR session that has not started streaming yet.
///
/// Use `get_failover_logs()` and `request_stream()` to set up partitions,
/// then `start()` to hand the connection to the runtime loop.
pub struct Feed<S> {
    reader: FrameReader<ReadHalf<S>>,
    transmit: TransmitHandle,
    worker: TransmitWorker,
    registry: StreamRegistry,
    config: FeedConfig,
    observer: Arc<dyn FeedObserver>,
}

impl<S> Feed<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn open(stream: S, config: FeedConfig, observer: Arc<dyn FeedObserver>) -> Result<Self> {
        config.validate()?;

        // 1. Split and send Open before any task exists
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::with_max_body(read_half, config.max_body_size);
        handshake::open(&mut reader, &mut write_half, &config.name, config.sequence).await?;

        // 2. Everything from here on goes through the worker
        let (transmit, worker) = spawn_transmit_worker(write_half, config.transmit_capacity);

        // 3. Flow-control window
        if let Err(e) = handshake::negotiate_window(&transmit, config.buffer_size).await {
            return Err(match worker.stop().await {
                Ok(Err(write_error)) => write_error,
                _ => e,
            });
        }

        tracing::info!("UPR feed {} opened", config.name);

        Ok(Self {
            reader,
            transmit,
            worker,
            registry: StreamRegistry::new(),
            config,
            observer,
        })
    }

    /// Fetch the failover log of each partition.
    ///
    /// Must be called before any `request_stream()`: once a stream request
    /// is out, its reply may arrive first and would be consumed here. Fails
    /// with [`UprError::StreamsRequested`] without sending anything.
    pub async fn get_failover_logs(&mut self, partitions: &[u16]) -> Result<HashMap<u16, FailoverLog>> {
        if !self.registry.is_empty() {
            return Err(UprError::StreamsRequested(self.registry.len()));
        }
        handshake::get_failover_logs(&mut self.reader, &self.transmit, partitions).await
    }

    /// Request a stream for one partition.
    ///
    /// The producer's answer arrives as an event once the feed has started.
    /// Requesting a partition again replaces its tracked state.
    pub async fn request_stream(&mut self, request: StreamRequest) -> Result<()> {
        self.registry.request(&self.transmit, request).await
    }

    /// Partitions requested so far.
    pub fn streams(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Start the runtime loop.
    pub fn start(self) -> FeedHandle {
        let (events_tx, events) = mpsc::channel(self.config.event_capacity);
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);

        let runtime = FeedRuntime {
            reader: self.reader,
            registry: self.registry,
            transmit: self.transmit,
            events: events_tx,
            requests: requests_rx,
            cancel: cancel_rx,
            observer: self.observer,
            stats: FeedStats::default(),
        };
        let task = tokio::spawn(runtime.run(self.worker));

        FeedHandle {
            events,
            requests,
            cancel,
            task,
        }
    }
}

/// A running feed.
///
/// Dropping the handle cancels the feed.
pub struct FeedHandle {
    events: mpsc::Receiver<Event>,
    requests: mpsc::UnboundedSender<StreamRequest>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<RuntimeExit>,
}

impl FeedHandle {
    /// Next event, or `None` once the feed has terminated.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Request another stream while the feed runs.
    ///
    /// The request is sent by the runtime loop; a transmit failure shows up
    /// as an error event for the partition.
    pub fn request_stream(&self, request: StreamRequest) -> Result<()> {
        self.requests.send(request).map_err(|_| UprError::FeedClosed)
    }

    /// Ask the runtime loop to stop. Safe to call more than once.
    pub fn close(&self) {
        self.cancel.send_replace(true);
    }

    /// True once the runtime loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the runtime loop to exit.
    ///
    /// Events not yet received are dropped. Returns the final counters, or
    /// the error that terminated the feed.
    pub async fn wait(self) -> Result<FeedStats> {
        let FeedHandle {
            events,
            requests: _requests,
            cancel: _cancel,
            task,
        } = self;
        drop(events);

        let exit = task.await?;
        match exit.error {
            Some(e) => Err(e),
            None => Ok(exit.stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_method_chaining() {
        let builder = FeedBuilder::new()
            .name("projector")
            .sequence(3)
            .buffer_size(1024)
            .event_capacity(16)
            .transmit_capacity(4)
            .max_body_size(1 << 20);

        assert_eq!(builder.config.name, "projector");
        assert_eq!(builder.config.sequence, 3);
        assert_eq!(builder.config.buffer_size, 1024);
        assert_eq!(builder.config.event_capacity, 16);
        assert_eq!(builder.config.transmit_capacity, 4);
        assert_eq!(builder.config.max_body_size, 1 << 20);
    }

    #[test]
    fn test_builder_default() {
        let builder = FeedBuilder::default();
        assert_eq!(builder.config, FeedConfig::default());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let (client, _server) = tokio::io::duplex(64);
        let result = FeedBuilder::new().event_capacity(0).open(client).await;
        assert!(matches!(result, Err(UprError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = FeedBuilder::new().connect(addr).await;
        assert!(matches!(result, Err(UprError::Io(_))));
    }
}
