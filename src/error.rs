//! Error types for upr-client.

use thiserror::Error;

use crate::protocol::{Opcode, Status};

/// Main error type for all feed operations.
#[derive(Debug, Error)]
pub enum UprError {
    /// I/O error on the producer connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Producer closed the connection between frames.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transmit worker is gone; nothing more can be sent.
    #[error("Transmit worker stopped")]
    TransmitClosed,

    /// Malformed frame on the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame body exceeds the configured limit.
    #[error("Frame body of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: u32, max: u32 },

    /// Open response carried another opcode.
    #[error("Handshake failed: unexpected opcode 0x{0:02x}")]
    HandshakeOpcode(u8),

    /// Response opaque does not echo the request.
    #[error("Opaque mismatch: expected 0x{expected:08x}, got 0x{got:08x}")]
    OpaqueMismatch { expected: u32, got: u32 },

    /// Open was refused by the producer.
    #[error("Handshake failed: {0}")]
    HandshakeStatus(Status),

    /// Synchronous request got a response for something else.
    #[error("Unexpected response to {expected}: opcode 0x{opcode:02x}, status {status}")]
    UnexpectedResponse {
        expected: Opcode,
        opcode: u8,
        status: Status,
    },

    /// Failover log body is not a whole number of entries.
    #[error("Invalid body length {0} in failover log")]
    FailoverLogLength(usize),

    /// Failover log is absent or empty.
    #[error("Invalid failover log")]
    InvalidLog,

    /// Rollback response without an 8-byte seqno.
    #[error("Invalid rollback extras of {0} bytes")]
    MalformedRollback(usize),

    /// Synchronous request issued after stream requests were sent.
    #[error("Failover logs must be fetched before requesting streams ({0} requested)")]
    StreamsRequested(usize),

    /// Stream request refused for a partition.
    #[error("Stream request for partition {partition} failed: {status}")]
    StreamStatus { partition: u16, status: Status },

    /// Rejected configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Feed already terminated.
    #[error("Feed closed")]
    FeedClosed,

    /// Runtime task panicked or was aborted.
    #[error("Feed task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias using UprError.
pub type Result<T> = std::result::Result<T, UprError>;
