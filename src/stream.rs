//! Per-partition stream state and the stream request protocol.
//!
//! Every per-partition request uses the partition id as its opaque, and the
//! producer echoes it on every frame of that stream. The registry is keyed by
//! that value; session-level sentinel opaques never fit in a partition id.

use std::collections::HashMap;

use bytes::Buf;

use crate::error::{Result, UprError};
use crate::event::FailoverLog;
use crate::protocol::{Frame, Opcode, Status};
use crate::writer::TransmitHandle;

/// Length of the stream request extras block.
pub const STREAM_REQUEST_EXTRAS_LEN: usize = 48;

/// Length of the rollback seqno carried by a rollback response.
pub const ROLLBACK_EXTRAS_LEN: usize = 8;

/// Partition id for an opaque value, if it is a per-partition opaque.
#[inline]
pub fn partition_of(opaque: u32) -> Option<u16> {
    u16::try_from(opaque).ok()
}

/// Parameters of a stream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub partition: u16,
    pub flags: u32,
    /// Partition epoch (vbucket UUID) the start seqno belongs to.
    pub epoch: u64,
    pub start_seqno: u64,
    pub end_seqno: u64,
    pub snapshot_start: u64,
    pub snapshot_end: u64,
}

impl StreamRequest {
    /// Request with zero flags and an empty snapshot range.
    pub fn new(partition: u16, epoch: u64, start_seqno: u64, end_seqno: u64) -> Self {
        Self {
            partition,
            flags: 0,
            epoch,
            start_seqno,
            end_seqno,
            snapshot_start: 0,
            snapshot_end: 0,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_snapshot(mut self, start: u64, end: u64) -> Self {
        self.snapshot_start = start;
        self.snapshot_end = end;
        self
    }

    /// Encode the 48-byte extras block.
    ///
    /// Layout (BE): flags:4, reserved:4, start:8, end:8, epoch:8,
    /// snapStart:8, snapEnd:8.
    pub fn encode_extras(&self) -> [u8; STREAM_REQUEST_EXTRAS_LEN] {
        let mut buf = [0u8; STREAM_REQUEST_EXTRAS_LEN];
        buf[0..4].copy_from_slice(&self.flags.to_be_bytes());
        // 4..8 reserved
        buf[8..16].copy_from_slice(&self.start_seqno.to_be_bytes());
        buf[16..24].copy_from_slice(&self.end_seqno.to_be_bytes());
        buf[24..32].copy_from_slice(&self.epoch.to_be_bytes());
        buf[32..40].copy_from_slice(&self.snapshot_start.to_be_bytes());
        buf[40..48].copy_from_slice(&self.snapshot_end.to_be_bytes());
        buf
    }

    /// Decode an extras block produced by [`encode_extras`](Self::encode_extras).
    pub fn decode_extras(partition: u16, extras: &[u8]) -> Option<Self> {
        if extras.len() != STREAM_REQUEST_EXTRAS_LEN {
            return None;
        }
        let mut buf = extras;
        let flags = buf.get_u32();
        let _reserved = buf.get_u32();
        let start_seqno = buf.get_u64();
        let end_seqno = buf.get_u64();
        let epoch = buf.get_u64();
        let snapshot_start = buf.get_u64();
        let snapshot_end = buf.get_u64();
        Some(Self {
            partition,
            flags,
            epoch,
            start_seqno,
            end_seqno,
            snapshot_start,
            snapshot_end,
        })
    }

    /// Wire frame for this request.
    pub fn to_frame(&self) -> Frame {
        Frame::request(Opcode::StreamRequest)
            .with_vbucket(self.partition)
            .with_opaque(self.partition as u32)
            .with_extras(self.encode_extras().to_vec())
    }
}

/// Lifecycle of a registered stream. Ended streams leave the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Request sent, no confirmation yet.
    Requested,
    /// Producer accepted the request.
    Connected,
}

/// Subscription state for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub partition: u16,
    pub epoch: u64,
    pub start_seqno: u64,
    pub end_seqno: u64,
    connected: bool,
}

impl Stream {
    pub(crate) fn from_request(request: &StreamRequest) -> Self {
        Self {
            partition: request.partition,
            epoch: request.epoch,
            start_seqno: request.start_seqno,
            end_seqno: request.end_seqno,
            connected: false,
        }
    }

    pub fn state(&self) -> StreamState {
        if self.connected {
            StreamState::Connected
        } else {
            StreamState::Requested
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Re-request this stream from `seqno` after a rollback.
    ///
    /// Epoch and end seqno are kept; flags and snapshot bounds reset.
    pub fn rollback_request(&self, seqno: u64) -> StreamRequest {
        StreamRequest::new(self.partition, self.epoch, seqno, self.end_seqno)
    }
}

/// Partition id to stream map for one connection.
///
/// Only ever touched by one task at a time: the feed before `start()`, the
/// runtime loop after.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<u16, Stream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a stream request and track the partition.
    ///
    /// Replaces any previous entry for the partition. The entry is only
    /// added once the frame was handed to the transmit worker.
    pub(crate) async fn request(
        &mut self,
        transmit: &TransmitHandle,
        request: StreamRequest,
    ) -> Result<()> {
        if let Err(e) = transmit.send(request.to_frame()).await {
            tracing::error!("Error in stream request for partition {}: {}", request.partition, e);
            return Err(e);
        }
        self.insert(Stream::from_request(&request));
        Ok(())
    }

    pub(crate) fn insert(&mut self, stream: Stream) -> Option<Stream> {
        self.streams.insert(stream.partition, stream)
    }

    pub fn get(&self, partition: u16) -> Option<&Stream> {
        self.streams.get(&partition)
    }

    pub(crate) fn mark_connected(&mut self, partition: u16) {
        if let Some(stream) = self.streams.get_mut(&partition) {
            stream.connected = true;
        }
    }

    pub(crate) fn remove(&mut self, partition: u16) -> Option<Stream> {
        self.streams.remove(&partition)
    }

    pub fn contains(&self, partition: u16) -> bool {
        self.streams.contains_key(&partition)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }
}

/// Outcome of a stream request that isn't an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamResponse {
    /// Producer accepted the stream and sent its failover log.
    Accepted(FailoverLog),
    /// Producer wants the stream restarted from this seqno.
    Rollback(u64),
}

/// Classify a stream request response frame.
///
/// Rollback is a normal outcome, not an error. Errors:
/// - [`UprError::MalformedRollback`] when rollback extras aren't 8 bytes
/// - [`UprError::StreamStatus`] for any other non-success status
/// - [`UprError::FailoverLogLength`] when the success body is malformed
pub fn classify_stream_response(frame: &Frame) -> Result<StreamResponse> {
    let status = frame.status();

    if status == Status::ROLLBACK {
        if frame.extras.len() != ROLLBACK_EXTRAS_LEN {
            return Err(UprError::MalformedRollback(frame.extras.len()));
        }
        let seqno = (&frame.extras[..]).get_u64();
        tracing::info!("Rollback {} for partition {}", seqno, frame.opaque);
        return Ok(StreamResponse::Rollback(seqno));
    }

    if !status.is_success() {
        return Err(UprError::StreamStatus {
            partition: frame.opaque as u16,
            status,
        });
    }

    FailoverLog::decode(&frame.body).map(StreamResponse::Accepted)
}
