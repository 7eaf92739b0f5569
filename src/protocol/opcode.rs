//! UPR operation kinds.
//!
//! The same closed set tags frames on the wire and events handed to the
//! consumer.

use std::fmt;

/// UPR operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Open,
    AddStream,
    CloseStream,
    FailoverLog,
    StreamRequest,
    StreamEnd,
    SnapshotMarker,
    Mutation,
    Deletion,
    Expiration,
    Flush,
    Control,
    BufferAck,
    Noop,
}

impl Opcode {
    /// Every opcode, in protocol order.
    pub const ALL: [Opcode; 14] = [
        Opcode::Open,
        Opcode::AddStream,
        Opcode::CloseStream,
        Opcode::FailoverLog,
        Opcode::StreamRequest,
        Opcode::StreamEnd,
        Opcode::SnapshotMarker,
        Opcode::Mutation,
        Opcode::Deletion,
        Opcode::Expiration,
        Opcode::Flush,
        Opcode::Control,
        Opcode::BufferAck,
        Opcode::Noop,
    ];

    /// Memcached command code for this opcode.
    pub fn wire(self) -> u8 {
        match self {
            Opcode::Open => 0x50,
            Opcode::AddStream => 0x51,
            Opcode::CloseStream => 0x52,
            Opcode::StreamRequest => 0x53,
            Opcode::FailoverLog => 0x54,
            Opcode::StreamEnd => 0x55,
            Opcode::SnapshotMarker => 0x56,
            Opcode::Mutation => 0x57,
            Opcode::Deletion => 0x58,
            Opcode::Expiration => 0x59,
            Opcode::Flush => 0x5a,
            Opcode::Noop => 0x5c,
            Opcode::BufferAck => 0x5d,
            Opcode::Control => 0x5e,
        }
    }

    /// Map a command code back to an opcode.
    ///
    /// Returns `None` for codes outside the UPR range.
    pub fn from_wire(code: u8) -> Option<Self> {
        Some(match code {
            0x50 => Opcode::Open,
            0x51 => Opcode::AddStream,
            0x52 => Opcode::CloseStream,
            0x53 => Opcode::StreamRequest,
            0x54 => Opcode::FailoverLog,
            0x55 => Opcode::StreamEnd,
            0x56 => Opcode::SnapshotMarker,
            0x57 => Opcode::Mutation,
            0x58 => Opcode::Deletion,
            0x59 => Opcode::Expiration,
            0x5a => Opcode::Flush,
            0x5c => Opcode::Noop,
            0x5d => Opcode::BufferAck,
            0x5e => Opcode::Control,
            _ => return None,
        })
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Open => "Open",
            Opcode::AddStream => "AddStream",
            Opcode::CloseStream => "CloseStream",
            Opcode::FailoverLog => "FailoverLog",
            Opcode::StreamRequest => "StreamRequest",
            Opcode::StreamEnd => "StreamEnd",
            Opcode::SnapshotMarker => "SnapshotMarker",
            Opcode::Mutation => "Mutation",
            Opcode::Deletion => "Deletion",
            Opcode::Expiration => "Expiration",
            Opcode::Flush => "Flush",
            Opcode::Control => "Flow Control",
            Opcode::BufferAck => "Buffer Acknowledgement",
            Opcode::Noop => "Noop",
        }
    }

    /// Item-level change carrying seqno, flags and expiry extras.
    #[inline]
    pub fn is_mutation(self) -> bool {
        matches!(self, Opcode::Mutation | Opcode::Deletion | Opcode::Expiration)
    }

    /// Event that terminates a partition stream.
    #[inline]
    pub fn closes_stream(self) -> bool {
        matches!(self, Opcode::StreamEnd | Opcode::CloseStream)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
