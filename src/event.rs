//! Events delivered to the consumer and the failover log they may carry.

use std::fmt;

use bytes::{Buf, Bytes};

use crate::error::{Result, UprError};
use crate::protocol::{Frame, Opcode, Status};
use crate::stream::Stream;

/// Bytes per failover log entry (epoch:8, seqno:8).
pub const FAILOVER_ENTRY_SIZE: usize = 16;

/// Minimum extras carried by mutations and snapshot markers.
const ITEM_EXTRAS_LEN: usize = 16;

/// Snapshot marker extras including the type field.
const SNAPSHOT_EXTRAS_LEN: usize = 20;

/// One branch point in a partition's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverEntry {
    /// Partition epoch (vbucket UUID).
    pub epoch: u64,
    /// Sequence number at which this epoch began.
    pub seqno: u64,
}

/// Ordered (epoch, seqno) history of a partition, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailoverLog {
    entries: Vec<FailoverEntry>,
}

impl FailoverLog {
    pub fn new(entries: Vec<FailoverEntry>) -> Self {
        Self { entries }
    }

    /// Parse a failover log response body.
    ///
    /// The body must be a whole number of 16-byte entries. An empty body is
    /// an empty (but valid) log.
    ///
    /// # Example
    ///
    /// ```
    /// use upr_client::FailoverLog;
    ///
    /// let mut body = Vec::new();
    /// body.extend_from_slice(&7u64.to_be_bytes());
    /// body.extend_from_slice(&100u64.to_be_bytes());
    ///
    /// let log = FailoverLog::decode(&body).unwrap();
    /// assert_eq!(log.latest().unwrap().seqno, 100);
    /// assert!(FailoverLog::decode(&body[..15]).is_err());
    /// ```
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() % FAILOVER_ENTRY_SIZE != 0 {
            return Err(UprError::FailoverLogLength(body.len()));
        }

        let entries = body
            .chunks_exact(FAILOVER_ENTRY_SIZE)
            .map(|mut pair| FailoverEntry {
                epoch: pair.get_u64(),
                seqno: pair.get_u64(),
            })
            .collect();
        Ok(Self { entries })
    }

    /// Encode back into the wire body layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(self.entries.len() * FAILOVER_ENTRY_SIZE);
        for entry in &self.entries {
            buf.extend_from_slice(&entry.epoch.to_be_bytes());
            buf.extend_from_slice(&entry.seqno.to_be_bytes());
        }
        Bytes::from(buf)
    }

    /// Most recent entry.
    ///
    /// Fails with [`UprError::InvalidLog`] when the log is empty.
    pub fn latest(&self) -> Result<FailoverEntry> {
        self.entries.last().copied().ok_or(UprError::InvalidLog)
    }

    pub fn entries(&self) -> &[FailoverEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Origin of a snapshot range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotType {
    #[default]
    Disk,
    Memory,
    /// Type value this client doesn't know, kept verbatim.
    Other(u32),
}

impl SnapshotType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => SnapshotType::Disk,
            1 => SnapshotType::Memory,
            other => SnapshotType::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            SnapshotType::Disk => 0,
            SnapshotType::Memory => 1,
            SnapshotType::Other(raw) => raw,
        }
    }
}

/// A decoded UPR event.
#[derive(Debug)]
pub struct Event {
    /// Type of event.
    pub opcode: Opcode,
    /// Response status (success for producer-initiated frames).
    pub status: Status,
    /// Partition this event applies to.
    pub partition: u16,
    /// Partition epoch the stream was requested with.
    pub epoch: u64,
    /// Item flags.
    pub flags: u32,
    /// Item expiration time.
    pub expiry: u32,
    /// Item key.
    pub key: Bytes,
    /// Item value.
    pub value: Bytes,
    /// CAS value of the item.
    pub cas: u64,
    /// Sequence number of the mutation, or the requested start seqno for a
    /// stream request confirmation.
    pub seqno: u64,
    /// First seqno of the snapshot.
    pub snapshot_start: u64,
    /// Last seqno of the snapshot.
    pub snapshot_end: u64,
    pub snapshot_type: SnapshotType,
    /// Failover log returned with a stream request confirmation.
    pub failover_log: Option<FailoverLog>,
    /// Set when the event reports a failure for its partition.
    pub error: Option<UprError>,
}

impl Event {
    /// Build an event from a received frame and the stream it belongs to.
    ///
    /// Partition and epoch come from the stream, never from the frame.
    pub(crate) fn from_frame(opcode: Opcode, frame: &Frame, stream: &Stream) -> Self {
        let mut event = Self::empty(opcode, stream.partition);
        event.status = frame.status();
        event.epoch = stream.epoch;
        event.key = frame.key.clone();
        event.value = frame.body.clone();
        event.cas = frame.cas;

        if frame.extras.len() >= ITEM_EXTRAS_LEN {
            let mut extras = &frame.extras[..];
            if opcode.is_mutation() {
                event.seqno = extras.get_u64();
                event.flags = extras.get_u32();
                event.expiry = extras.get_u32();
            } else if opcode == Opcode::SnapshotMarker {
                event.snapshot_start = extras.get_u64();
                event.snapshot_end = extras.get_u64();
                if frame.extras.len() >= SNAPSHOT_EXTRAS_LEN {
                    event.snapshot_type = SnapshotType::from_raw(extras.get_u32());
                }
            }
        }

        event
    }

    /// Error event for a partition that has no usable stream frame.
    pub(crate) fn failed(opcode: Opcode, partition: u16, status: Status, error: UprError) -> Self {
        let mut event = Self::empty(opcode, partition);
        event.status = status;
        event.error = Some(error);
        event
    }

    fn empty(opcode: Opcode, partition: u16) -> Self {
        Self {
            opcode,
            status: Status::SUCCESS,
            partition,
            epoch: 0,
            flags: 0,
            expiry: 0,
            key: Bytes::new(),
            value: Bytes::new(),
            cas: 0,
            seqno: 0,
            snapshot_start: 0,
            snapshot_end: 0,
            snapshot_type: SnapshotType::Disk,
            failover_log: None,
            error: None,
        }
    }

    pub(crate) fn with_error(mut self, error: UprError) -> Self {
        self.error = Some(error);
        self
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Latest entry of the attached failover log.
    ///
    /// Fails with [`UprError::InvalidLog`] when no log is attached or it is
    /// empty.
    pub fn latest_failover(&self) -> Result<FailoverEntry> {
        match &self.failover_log {
            Some(log) => log.latest(),
            None => Err(UprError::InvalidLog),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())
    }
}
