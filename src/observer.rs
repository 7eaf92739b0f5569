//! Stats hooks injected into a feed.
//!
//! A feed never reaches for process-wide counters. Whatever wants numbers
//! (metrics exporter, test probe) implements [`FeedObserver`] and is handed
//! to the builder; the default is [`NoopObserver`].

use crate::error::UprError;
use crate::event::Event;
use crate::protocol::Opcode;

/// Counters kept by the runtime loop for one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Frames read off the connection.
    pub frames: u64,
    /// Bytes read off the connection, headers included.
    pub bytes_read: u64,
    /// Mutation, deletion and expiration frames.
    pub mutations: u64,
    /// Snapshot markers.
    pub snapshots: u64,
    /// Rollbacks handled.
    pub rollbacks: u64,
    /// Events handed to the consumer.
    pub events: u64,
    /// Buffer acks queued.
    pub acks: u64,
}

/// Callbacks invoked from the runtime loop. All default to no-ops.
///
/// Implementations run inline on the loop and must not block.
pub trait FeedObserver: Send + Sync + 'static {
    /// A frame was read. `opcode` is `None` for unknown command codes.
    fn frame_received(&self, _opcode: Option<Opcode>, _bytes: usize) {}

    /// An event is about to be delivered to the consumer.
    fn event_emitted(&self, _event: &Event) {}

    /// The producer asked for a rollback of `partition` to `seqno`.
    fn rollback(&self, _partition: u16, _seqno: u64) {}

    /// A buffer ack for `bytes` was queued.
    fn ack_sent(&self, _bytes: u32) {}

    /// The runtime loop has exited.
    fn feed_closed(&self, _stats: &FeedStats, _error: Option<&UprError>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FeedObserver for NoopObserver {}
