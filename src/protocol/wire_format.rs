//! Wire format encoding and decoding.
//!
//! Implements the 24-byte memcached binary header used by UPR:
//! ```text
//! ┌───────┬────────┬─────────┬──────────┬──────────┬────────────────┐
//! │ Magic │ Opcode │ Key len │ Extras   │ DataType │ VBucket/Status │
//! │ 1 byte│ 1 byte │ 2 bytes │ 1 byte   │ 1 byte   │ 2 bytes        │
//! ├───────┴────────┴─────────┴──────────┴──────────┴────────────────┤
//! │ Total body length (4)  │ Opaque (4)  │ CAS (8)                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The body is `extras ++ key ++ value`. All multi-byte integers are Big Endian.

use crate::error::{Result, UprError};

/// Header size in bytes (fixed, exactly 24).
pub const HEADER_SIZE: usize = 24;

/// Default maximum body size (20 MB item plus extras headroom).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 21 * 1024 * 1024;

/// Magic byte for frames sent as requests (either direction).
pub const MAGIC_REQUEST: u8 = 0x80;

/// Magic byte for frames sent as responses.
pub const MAGIC_RESPONSE: u8 = 0x81;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Request or response magic.
    pub magic: u8,
    /// Raw command code.
    pub opcode: u8,
    /// Key length in bytes.
    pub key_length: u16,
    /// Extras length in bytes.
    pub extras_length: u8,
    /// Data type (unused by UPR, carried through).
    pub data_type: u8,
    /// Partition id on requests, status on responses.
    pub vbucket: u16,
    /// Length of extras + key + value.
    pub body_length: u32,
    /// Correlation value echoed by the peer.
    pub opaque: u32,
    /// Compare-and-swap value.
    pub cas: u64,
}

impl Header {
    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use upr_client::protocol::{Header, MAGIC_REQUEST};
    ///
    /// let header = Header {
    ///     magic: MAGIC_REQUEST,
    ///     opcode: 0x5c,
    ///     key_length: 0,
    ///     extras_length: 0,
    ///     data_type: 0,
    ///     vbucket: 0,
    ///     body_length: 0,
    ///     opaque: 7,
    ///     cas: 0,
    /// };
    /// assert_eq!(header.encode().len(), 24);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.magic;
        buf[1] = self.opcode;
        buf[2..4].copy_from_slice(&self.key_length.to_be_bytes());
        buf[4] = self.extras_length;
        buf[5] = self.data_type;
        buf[6..8].copy_from_slice(&self.vbucket.to_be_bytes());
        buf[8..12].copy_from_slice(&self.body_length.to_be_bytes());
        buf[12..16].copy_from_slice(&self.opaque.to_be_bytes());
        buf[16..24].copy_from_slice(&self.cas.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: buf[0],
            opcode: buf[1],
            key_length: u16::from_be_bytes([buf[2], buf[3]]),
            extras_length: buf[4],
            data_type: buf[5],
            vbucket: u16::from_be_bytes([buf[6], buf[7]]),
            body_length: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            opaque: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            cas: u64::from_be_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
        })
    }

    /// Validate the header before reading its body.
    ///
    /// Checks:
    /// - Magic is a request or response magic
    /// - Body length doesn't exceed max
    /// - Extras and key fit inside the body
    pub fn validate(&self, max_body_size: u32) -> Result<()> {
        if self.magic != MAGIC_REQUEST && self.magic != MAGIC_RESPONSE {
            return Err(UprError::Protocol(format!(
                "bad magic 0x{:02x}",
                self.magic
            )));
        }

        if self.body_length > max_body_size {
            return Err(UprError::FrameTooLarge {
                size: self.body_length,
                max: max_body_size,
            });
        }

        let fixed = self.extras_length as u32 + self.key_length as u32;
        if fixed > self.body_length {
            return Err(UprError::Protocol(format!(
                "extras ({}) and key ({}) exceed body length {}",
                self.extras_length, self.key_length, self.body_length
            )));
        }

        Ok(())
    }

    /// Check if this header carries response magic.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.magic == MAGIC_RESPONSE
    }
}
