//! Frame struct with typed accessors.
//!
//! Represents a complete memcached binary packet. Extras, key and value
//! sections are `bytes::Bytes` slices of the same received buffer, so
//! splitting a body costs no copies.
//!
//! # Example
//!
//! ```
//! use upr_client::protocol::{Frame, Opcode};
//!
//! let frame = Frame::request(Opcode::Control)
//!     .with_key("connection_buffer_size")
//!     .with_body("1024");
//!
//! assert_eq!(frame.opcode(), Some(Opcode::Control));
//! assert_eq!(frame.size(), 24 + 22 + 4);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::opcode::Opcode;
use super::status::Status;
use super::wire_format::{Header, HEADER_SIZE, MAGIC_REQUEST, MAGIC_RESPONSE};
use crate::error::{Result, UprError};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Request or response magic.
    pub magic: u8,
    /// Raw command code (see [`Opcode::from_wire`]).
    pub opcode: u8,
    /// Data type byte.
    pub data_type: u8,
    /// Partition id on requests, status on responses.
    pub vbucket: u16,
    /// Correlation value.
    pub opaque: u32,
    /// Compare-and-swap value.
    pub cas: u64,
    /// Extras section.
    pub extras: Bytes,
    /// Key section.
    pub key: Bytes,
    /// Value section.
    pub body: Bytes,
}

impl Frame {
    /// Empty request frame for `opcode`.
    pub fn request(opcode: Opcode) -> Self {
        Self::with_magic(MAGIC_REQUEST, opcode)
    }

    /// Empty response frame for `opcode`.
    pub fn response(opcode: Opcode) -> Self {
        Self::with_magic(MAGIC_RESPONSE, opcode)
    }

    fn with_magic(magic: u8, opcode: Opcode) -> Self {
        Self {
            magic,
            opcode: opcode.wire(),
            data_type: 0,
            vbucket: 0,
            opaque: 0,
            cas: 0,
            extras: Bytes::new(),
            key: Bytes::new(),
            body: Bytes::new(),
        }
    }

    /// Split a received body into extras, key and value.
    ///
    /// `body` must be exactly `header.body_length` bytes.
    pub fn from_parts(header: Header, mut body: Bytes) -> Result<Self> {
        if body.len() != header.body_length as usize {
            return Err(UprError::Protocol(format!(
                "body is {} bytes, header says {}",
                body.len(),
                header.body_length
            )));
        }
        if header.extras_length as usize + header.key_length as usize > body.len() {
            return Err(UprError::Protocol(
                "extras and key exceed body".to_string(),
            ));
        }

        let extras = body.split_to(header.extras_length as usize);
        let key = body.split_to(header.key_length as usize);

        Ok(Self {
            magic: header.magic,
            opcode: header.opcode,
            data_type: header.data_type,
            vbucket: header.vbucket,
            opaque: header.opaque,
            cas: header.cas,
            extras,
            key,
            body,
        })
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_vbucket(mut self, vbucket: u16) -> Self {
        self.vbucket = vbucket;
        self
    }

    /// Set the status field (same slot as the vbucket on requests).
    pub fn with_status(mut self, status: Status) -> Self {
        self.vbucket = status.0;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Decoded opcode, `None` for command codes outside UPR.
    #[inline]
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_wire(self.opcode)
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.magic == MAGIC_RESPONSE
    }

    /// Response status. Request frames carry a partition id in that slot
    /// and always report success.
    #[inline]
    pub fn status(&self) -> Status {
        if self.is_response() {
            Status(self.vbucket)
        } else {
            Status::SUCCESS
        }
    }

    /// Total bytes this frame occupies on the wire, header included.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.body_length()
    }

    #[inline]
    fn body_length(&self) -> usize {
        self.extras.len() + self.key.len() + self.body.len()
    }

    /// Header describing this frame.
    pub fn header(&self) -> Header {
        Header {
            magic: self.magic,
            opcode: self.opcode,
            key_length: self.key.len() as u16,
            extras_length: self.extras.len() as u8,
            data_type: self.data_type,
            vbucket: self.vbucket,
            body_length: self.body_length() as u32,
            opaque: self.opaque,
            cas: self.cas,
        }
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_slice(&self.header().encode());
        buf.put_slice(&self.extras);
        buf.put_slice(&self.key);
        buf.put_slice(&self.body);
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode_into(&mut buf);
        buf.freeze()
    }
}
