//! Feed runtime loop.
//!
//! One task per feed reads frames off the hijacked connection, classifies
//! them, keeps the stream registry current and hands events to the consumer.
//! It is the only owner of the registry once the feed has started, so
//! partition state needs no locking. Everything it sends goes through the
//! transmit worker.
//!
//! Each iteration waits (in priority order) for:
//! 1. cancellation from the consumer,
//! 2. a stream request the consumer submitted after start,
//! 3. the next inbound frame.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};

use crate::error::{Result, UprError};
use crate::event::Event;
use crate::observer::{FeedObserver, FeedStats};
use crate::protocol::{Frame, Opcode, Status};
use crate::stream::{classify_stream_response, partition_of, StreamRegistry, StreamRequest, StreamResponse};
use crate::transport::FrameReader;
use crate::writer::{TransmitHandle, TransmitWorker};

/// Whether the loop keeps going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop,
}

/// What the loop hands back when it exits.
pub(crate) struct RuntimeExit {
    pub stats: FeedStats,
    pub error: Option<UprError>,
}

pub(crate) struct FeedRuntime<R> {
    pub reader: FrameReader<R>,
    pub registry: StreamRegistry,
    pub transmit: TransmitHandle,
    pub events: mpsc::Sender<Event>,
    pub requests: mpsc::UnboundedReceiver<StreamRequest>,
    pub cancel: watch::Receiver<bool>,
    pub observer: Arc<dyn FeedObserver>,
    pub stats: FeedStats,
}

impl<R: AsyncRead + Unpin> FeedRuntime<R> {
    /// Run until terminal, then stop the transmit worker.
    ///
    /// A write failure reported by the worker replaces a missing or
    /// `TransmitClosed` terminal error. The event queue closes when `self`
    /// (and its sender) drops at the end of this call.
    pub(crate) async fn run(mut self, worker: TransmitWorker) -> RuntimeExit {
        let mut error = self.run_loop().await.err();

        let transmit_result = match worker.stop().await {
            Ok(result) => result,
            Err(e) => Err(UprError::Join(e)),
        };
        if let Err(e) = transmit_result {
            if matches!(error, None | Some(UprError::TransmitClosed)) {
                error = Some(e);
            }
        }

        match &error {
            Some(e) => tracing::error!("UPR feed terminated: {}", e),
            None => tracing::info!("UPR feed closed"),
        }
        self.observer.feed_closed(&self.stats, error.as_ref());

        RuntimeExit {
            stats: self.stats,
            error,
        }
    }

    async fn run_loop(&mut self) -> Result<()> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => {
                    tracing::debug!("UPR feed cancelled");
                    return Ok(());
                }
                Some(request) = self.requests.recv() => {
                    if self.submit(request).await == Step::Stop {
                        return Ok(());
                    }
                    continue;
                }
                frame = self.reader.next_frame() => frame?,
            };

            if self.process(frame).await? == Step::Stop {
                return Ok(());
            }
        }
    }

    /// Stream request submitted by the consumer after start.
    async fn submit(&mut self, request: StreamRequest) -> Step {
        match self.registry.request(&self.transmit, request).await {
            Ok(()) => Step::Continue,
            Err(e) => {
                let event = Event::failed(Opcode::StreamRequest, request.partition, Status::SUCCESS, e);
                self.deliver(event).await
            }
        }
    }

    /// Handle one inbound frame.
    async fn process(&mut self, frame: Frame) -> Result<Step> {
        let size = frame.size();
        let opcode = frame.opcode();
        self.stats.frames += 1;
        self.stats.bytes_read += size as u64;
        self.observer.frame_received(opcode, size);

        let Some(opcode) = opcode else {
            tracing::error!(
                "Received an unknown opcode 0x{:02x} for opaque {}",
                frame.opcode,
                frame.opaque
            );
            return Ok(Step::Continue);
        };

        let mut ack = false;
        let event = match opcode {
            Opcode::StreamRequest => self.on_stream_response(&frame).await,

            Opcode::Mutation | Opcode::Deletion | Opcode::Expiration => {
                self.stats.mutations += 1;
                ack = true;
                self.stream_event(opcode, &frame)
            }

            Opcode::StreamEnd => {
                ack = true;
                let event = self.stream_event(opcode, &frame);
                if let Some(event) = &event {
                    self.registry.remove(event.partition);
                    tracing::info!("Stream ended for partition {}", event.partition);
                }
                event
            }

            Opcode::SnapshotMarker => {
                self.stats.snapshots += 1;
                ack = true;
                self.stream_event(opcode, &frame)
            }

            Opcode::Flush => self.stream_event(opcode, &frame),

            Opcode::AddStream | Opcode::CloseStream => {
                tracing::warn!("Opcode {} not implemented", opcode);
                None
            }

            Opcode::Control | Opcode::BufferAck => {
                if !frame.status().is_success() {
                    tracing::warn!("Opcode {} received status {}", opcode, frame.status());
                }
                None
            }

            Opcode::Noop => {
                let reply = Frame::response(Opcode::Noop).with_opaque(frame.opaque);
                self.transmit.send(reply).await?;
                None
            }

            Opcode::Open | Opcode::FailoverLog => {
                tracing::warn!("Unexpected {} frame while streaming", opcode);
                None
            }
        };

        if let Some(event) = event {
            if self.deliver(event).await == Step::Stop {
                return Ok(Step::Stop);
            }
        }

        if ack {
            self.acknowledge(size).await?;
        }

        Ok(Step::Continue)
    }

    /// Event for a frame on a tracked partition.
    fn stream_event(&self, opcode: Opcode, frame: &Frame) -> Option<Event> {
        let stream = partition_of(frame.opaque).and_then(|p| self.registry.get(p));
        match stream {
            Some(stream) => Some(Event::from_frame(opcode, frame, stream)),
            None => {
                tracing::warn!(
                    "Dropping {} for untracked opaque {}",
                    opcode,
                    frame.opaque
                );
                None
            }
        }
    }

    /// Stream request response: confirm, roll back, or report.
    async fn on_stream_response(&mut self, frame: &Frame) -> Option<Event> {
        let stream = partition_of(frame.opaque)
            .and_then(|p| self.registry.get(p))
            .cloned();
        let Some(stream) = stream else {
            tracing::warn!("Stream not found for stream request opaque {}", frame.opaque);
            return None;
        };
        let partition = stream.partition;

        match classify_stream_response(frame) {
            Ok(StreamResponse::Rollback(seqno)) => {
                self.stats.rollbacks += 1;
                self.observer.rollback(partition, seqno);

                let retry = stream.rollback_request(seqno);
                match self.registry.request(&self.transmit, retry).await {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!(
                            "Stream request with rollback {} for partition {} failed: {}",
                            seqno,
                            partition,
                            e
                        );
                        let event = Event::from_frame(Opcode::StreamRequest, frame, &stream).with_error(e);
                        self.registry.remove(partition);
                        Some(event)
                    }
                }
            }

            Ok(StreamResponse::Accepted(log)) => {
                self.registry.mark_connected(partition);
                let mut event = Event::from_frame(Opcode::StreamRequest, frame, &stream);
                event.seqno = stream.start_seqno;
                event.failover_log = Some(log);
                Some(event)
            }

            Err(e) => {
                tracing::error!("Stream request for partition {} failed: {}", partition, e);
                Some(Event::failed(Opcode::StreamRequest, partition, frame.status(), e))
            }
        }
    }

    /// Hand an event to the consumer, racing cancellation.
    async fn deliver(&mut self, event: Event) -> Step {
        let opcode = event.opcode;
        self.observer.event_emitted(&event);

        tokio::select! {
            sent = self.events.send(event) => {
                if sent.is_err() {
                    tracing::debug!("Consumer dropped the event queue");
                    return Step::Stop;
                }
            }
            _ = cancelled(&mut self.cancel) => return Step::Stop,
        }
        self.stats.events += 1;

        if opcode.closes_stream() && self.registry.is_empty() {
            tracing::info!("No more streams");
            return Step::Stop;
        }
        Step::Continue
    }

    /// Tell the producer how many bytes of its window we consumed.
    async fn acknowledge(&mut self, size: usize) -> Result<()> {
        let bytes = size as u32;
        self.transmit.send(buffer_ack_frame(bytes)).await?;
        self.stats.acks += 1;
        self.observer.ack_sent(bytes);
        Ok(())
    }
}

/// BufferAck frame for `bytes` consumed.
pub fn buffer_ack_frame(bytes: u32) -> Frame {
    Frame::request(Opcode::BufferAck).with_body(bytes.to_be_bytes().to_vec())
}

/// Resolves once the feed is closed or its handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{FailoverEntry, FailoverLog, SnapshotType};
    use crate::observer::NoopObserver;
    use crate::stream::{Stream, STREAM_REQUEST_EXTRAS_LEN};
    use crate::writer::spawn_transmit_worker;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    struct Harness {
        producer_write: WriteHalf<DuplexStream>,
        producer_read: FrameReader<ReadHalf<DuplexStream>>,
        events: mpsc::Receiver<Event>,
        requests: mpsc::UnboundedSender<StreamRequest>,
        cancel: watch::Sender<bool>,
        task: tokio::task::JoinHandle<RuntimeExit>,
    }

    impl Harness {
        async fn send(&mut self, frame: Frame) {
            self.producer_write.write_all(&frame.encode()).await.unwrap();
        }

        async fn outbound(&mut self) -> Frame {
            self.producer_read.next_frame().await.unwrap()
        }
    }

    async fn harness(streams: &[StreamRequest]) -> Harness {
        let (client, producer) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (producer_read, producer_write) = tokio::io::split(producer);

        let (transmit, worker) = spawn_transmit_worker(client_write, 1);
        let mut registry = StreamRegistry::new();
        for request in streams {
            registry.request(&transmit, *request).await.unwrap();
        }

        let (events_tx, events) = mpsc::channel(1);
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);

        let runtime = FeedRuntime {
            reader: FrameReader::new(client_read),
            registry,
            transmit,
            events: events_tx,
            requests: requests_rx,
            cancel: cancel_rx,
            observer: Arc::new(NoopObserver),
            stats: FeedStats::default(),
        };
        let task = tokio::spawn(runtime.run(worker));

        let mut harness = Harness {
            producer_write,
            producer_read: FrameReader::new(producer_read),
            events,
            requests,
            cancel,
            task,
        };
        for _ in streams {
            let frame = harness.outbound().await;
            assert_eq!(frame.opcode(), Some(Opcode::StreamRequest));
        }
        harness
    }

    fn accepted(partition: u16) -> Frame {
        let log = FailoverLog::new(vec![FailoverEntry { epoch: 1, seqno: 0 }]);
        Frame::response(Opcode::StreamRequest)
            .with_opaque(partition as u32)
            .with_body(log.encode())
    }

    fn mutation(partition: u16, seqno: u64) -> Frame {
        let mut extras = seqno.to_be_bytes().to_vec();
        extras.extend_from_slice(&[0u8; 8]);
        Frame::request(Opcode::Mutation)
            .with_vbucket(partition)
            .with_opaque(partition as u32)
            .with_extras(extras)
            .with_key("k")
            .with_body("v")
    }

    #[test]
    fn test_buffer_ack_body() {
        let frame = buffer_ack_frame(137);
        assert_eq!(&frame.body[..], &[0, 0, 0, 137]);
        assert_eq!(frame.opcode(), Some(Opcode::BufferAck));
    }

    #[tokio::test]
    async fn test_ack_carries_whole_frame_size() {
        let mut h = harness(&[StreamRequest::new(0, 1, 0, u64::MAX)]).await;
        h.send(accepted(0)).await;
        h.events.recv().await.unwrap();

        let frame = mutation(0, 1);
        let size = frame.size() as u32;
        h.send(frame).await;

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.opcode, Opcode::Mutation);
        assert_eq!(event.seqno, 1);

        let ack = h.outbound().await;
        assert_eq!(ack.opcode(), Some(Opcode::BufferAck));
        assert_eq!(&ack.body[..], &size.to_be_bytes());
    }

    #[tokio::test]
    async fn test_noop_is_answered_without_event() {
        let mut h = harness(&[]).await;
        h.send(Frame::request(Opcode::Noop).with_opaque(77)).await;

        let reply = h.outbound().await;
        assert_eq!(reply.opcode(), Some(Opcode::Noop));
        assert!(reply.is_response());
        assert_eq!(reply.opaque, 77);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rollback_reissues_request() {
        let mut h = harness(&[StreamRequest::new(1, 9, 50, 900)]).await;
        h.send(
            Frame::response(Opcode::StreamRequest)
                .with_status(Status::ROLLBACK)
                .with_opaque(1)
                .with_extras(30u64.to_be_bytes().to_vec()),
        )
        .await;

        let retry = h.outbound().await;
        assert_eq!(retry.opcode(), Some(Opcode::StreamRequest));
        assert_eq!(retry.opaque, 1);
        assert_eq!(retry.extras.len(), STREAM_REQUEST_EXTRAS_LEN);
        let decoded = StreamRequest::decode_extras(1, &retry.extras).unwrap();
        assert_eq!(decoded, StreamRequest::new(1, 9, 30, 900));
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_error_status_emits_error_event() {
        let mut h = harness(&[StreamRequest::new(2, 1, 0, 10)]).await;
        h.send(
            Frame::response(Opcode::StreamRequest)
                .with_status(Status::NOT_MY_PARTITION)
                .with_opaque(2),
        )
        .await;

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.partition, 2);
        assert_eq!(event.status, Status::NOT_MY_PARTITION);
        assert!(matches!(event.error, Some(UprError::StreamStatus { .. })));
    }

    #[tokio::test]
    async fn test_untracked_partition_is_ignored() {
        let mut h = harness(&[StreamRequest::new(0, 1, 0, 10)]).await;
        h.send(mutation(5, 1)).await;
        h.send(Frame::request(Opcode::Noop)).await;

        // Ack for the ignored mutation still goes out, then the noop reply.
        assert_eq!(h.outbound().await.opcode(), Some(Opcode::BufferAck));
        assert_eq!(h.outbound().await.opcode(), Some(Opcode::Noop));
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_end_of_last_partition_stops_loop() {
        let mut h = harness(&[StreamRequest::new(0, 1, 0, 10)]).await;
        h.send(accepted(0)).await;
        h.events.recv().await.unwrap();

        h.send(Frame::request(Opcode::StreamEnd).with_opaque(0)).await;
        let event = h.events.recv().await.unwrap();
        assert_eq!(event.opcode, Opcode::StreamEnd);

        assert!(h.events.recv().await.is_none());
        let exit = h.task.await.unwrap();
        assert!(exit.error.is_none());
        assert_eq!(exit.stats.events, 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_loop() {
        let h = harness(&[]).await;
        h.cancel.send_replace(true);

        let exit = h.task.await.unwrap();
        assert!(exit.error.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_is_terminal_error() {
        let h = harness(&[]).await;
        drop(h.producer_write);
        drop(h.producer_read);

        let exit = h.task.await.unwrap();
        assert!(matches!(exit.error, Some(UprError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_request_after_start_is_sent_by_loop() {
        let mut h = harness(&[]).await;
        h.requests.send(StreamRequest::new(4, 2, 0, 10)).unwrap();

        let frame = h.outbound().await;
        assert_eq!(frame.opaque, 4);

        h.send(accepted(4)).await;
        let event = h.events.recv().await.unwrap();
        assert_eq!(event.partition, 4);
        assert_eq!(event.epoch, 2);
        assert_eq!(event.failover_log.unwrap().len(), 1);
    }

    fn item(opcode: Opcode, partition: u16, seqno: u64) -> Frame {
        let mut extras = seqno.to_be_bytes().to_vec();
        extras.extend_from_slice(&[0u8; 8]);
        Frame::request(opcode)
            .with_opaque(partition as u32)
            .with_extras(extras)
            .with_key("k")
    }

    fn snapshot(partition: u16, start: u64, end: u64, kind: u32) -> Frame {
        let mut extras = start.to_be_bytes().to_vec();
        extras.extend_from_slice(&end.to_be_bytes());
        extras.extend_from_slice(&kind.to_be_bytes());
        Frame::request(Opcode::SnapshotMarker)
            .with_opaque(partition as u32)
            .with_extras(extras)
    }

    async fn connected(streams: &[StreamRequest]) -> Harness {
        let mut h = harness(streams).await;
        for request in streams {
            h.send(accepted(request.partition)).await;
            let event = h.events.recv().await.unwrap();
            assert_eq!(event.opcode, Opcode::StreamRequest);
        }
        h
    }

    /// Noop round trip: every frame sent before it has been processed.
    async fn noop_round_trip(h: &mut Harness, opaque: u32) {
        h.send(Frame::request(Opcode::Noop).with_opaque(opaque)).await;
        let reply = h.outbound().await;
        assert_eq!(reply.opcode(), Some(Opcode::Noop));
        assert_eq!(reply.opaque, opaque);
    }

    #[tokio::test]
    async fn test_snapshot_marker_event_and_ack() {
        let mut h = connected(&[StreamRequest::new(0, 1, 0, 100)]).await;

        let frame = snapshot(0, 5, 10, 1);
        let size = frame.size() as u32;
        h.send(frame).await;

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.opcode, Opcode::SnapshotMarker);
        assert_eq!(event.snapshot_start, 5);
        assert_eq!(event.snapshot_end, 10);
        assert_eq!(event.snapshot_type, SnapshotType::Memory);

        let ack = h.outbound().await;
        assert_eq!(ack.opcode(), Some(Opcode::BufferAck));
        assert_eq!(&ack.body[..], &size.to_be_bytes());

        h.cancel.send_replace(true);
        let exit = h.task.await.unwrap();
        assert_eq!(exit.stats.snapshots, 1);
        assert_eq!(exit.stats.acks, 1);
    }

    #[tokio::test]
    async fn test_flush_event_without_ack() {
        let mut h = connected(&[StreamRequest::new(0, 1, 0, 100)]).await;

        h.send(Frame::request(Opcode::Flush).with_opaque(0)).await;
        let event = h.events.recv().await.unwrap();
        assert_eq!(event.opcode, Opcode::Flush);
        assert_eq!(event.partition, 0);

        // The next outbound frame is the noop reply, not an ack.
        noop_round_trip(&mut h, 3).await;
    }

    #[tokio::test]
    async fn test_deletion_and_expiration_are_acked() {
        let mut h = connected(&[StreamRequest::new(0, 1, 0, 100)]).await;

        for (seqno, opcode) in [(7, Opcode::Deletion), (8, Opcode::Expiration)] {
            let frame = item(opcode, 0, seqno);
            let size = frame.size() as u32;
            h.send(frame).await;

            let event = h.events.recv().await.unwrap();
            assert_eq!(event.opcode, opcode);
            assert_eq!(event.seqno, seqno);
            assert_eq!(&event.key[..], b"k");

            let ack = h.outbound().await;
            assert_eq!(ack.opcode(), Some(Opcode::BufferAck));
            assert_eq!(&ack.body[..], &size.to_be_bytes());
        }

        h.cancel.send_replace(true);
        let exit = h.task.await.unwrap();
        assert_eq!(exit.stats.mutations, 2);
    }

    #[tokio::test]
    async fn test_add_and_close_stream_are_ignored() {
        let mut h = connected(&[StreamRequest::new(0, 1, 0, 100)]).await;

        h.send(Frame::request(Opcode::AddStream).with_opaque(0)).await;
        h.send(Frame::request(Opcode::CloseStream).with_opaque(0)).await;
        noop_round_trip(&mut h, 4).await;

        assert!(h.events.try_recv().is_err());
        assert!(!h.task.is_finished());
    }

    #[tokio::test]
    async fn test_control_error_status_not_fatal() {
        let mut h = harness(&[]).await;

        h.send(Frame::response(Opcode::Control).with_status(Status::INVALID))
            .await;
        h.send(Frame::response(Opcode::BufferAck).with_status(Status::TEMPORARY_FAILURE))
            .await;
        noop_round_trip(&mut h, 6).await;

        assert!(h.events.try_recv().is_err());
        assert!(!h.task.is_finished());
    }

    #[tokio::test]
    async fn test_stream_end_with_streams_left_keeps_running() {
        let mut h = connected(&[
            StreamRequest::new(0, 1, 0, 100),
            StreamRequest::new(1, 2, 0, 100),
        ])
        .await;

        h.send(Frame::request(Opcode::StreamEnd).with_opaque(0)).await;
        let event = h.events.recv().await.unwrap();
        assert_eq!(event.opcode, Opcode::StreamEnd);
        assert_eq!(event.partition, 0);
        assert_eq!(h.outbound().await.opcode(), Some(Opcode::BufferAck));

        h.send(mutation(1, 3)).await;
        let event = h.events.recv().await.unwrap();
        assert_eq!(event.partition, 1);
        assert_eq!(event.epoch, 2);
        assert!(!h.task.is_finished());
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_retry_reports_then_drops_partition() {
        let (client, mut producer) = duplex(4096);

        // Kill the worker with a write failure before the loop starts.
        let (transmit, worker) = spawn_transmit_worker(BrokenPipe, 1);
        transmit.send(Frame::request(Opcode::Noop)).await.unwrap();
        while !transmit.is_closed() {
            tokio::task::yield_now().await;
        }

        let mut registry = StreamRegistry::new();
        registry.insert(Stream::from_request(&StreamRequest::new(1, 9, 50, 900)));

        let (events_tx, mut events) = mpsc::channel(1);
        let (_requests, requests_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let runtime = FeedRuntime {
            reader: FrameReader::new(client),
            registry,
            transmit,
            events: events_tx,
            requests: requests_rx,
            cancel: cancel_rx,
            observer: Arc::new(NoopObserver),
            stats: FeedStats::default(),
        };
        let task = tokio::spawn(runtime.run(worker));

        let rollback = Frame::response(Opcode::StreamRequest)
            .with_status(Status::ROLLBACK)
            .with_opaque(1)
            .with_extras(30u64.to_be_bytes().to_vec());
        producer.write_all(&rollback.encode()).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.opcode, Opcode::StreamRequest);
        assert_eq!(event.partition, 1);
        assert_eq!(event.epoch, 9);
        assert_eq!(event.status, Status::ROLLBACK);
        assert!(matches!(event.error, Some(UprError::TransmitClosed)));

        let flush = Frame::request(Opcode::Flush).with_opaque(1);
        producer.write_all(&flush.encode()).await.unwrap();
        let nothing = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
        assert!(nothing.is_err());

        cancel.send_replace(true);
        let exit = task.await.unwrap();
        assert_eq!(exit.stats.rollbacks, 1);
        // The worker's write failure is the terminal error.
        assert!(matches!(exit.error, Some(UprError::Io(_))));
    }
}
