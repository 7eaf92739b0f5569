//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 24 bytes
//! - `WaitingForBody`: Header parsed and validated, need N more body bytes
//!
//! Frames are pulled one at a time with [`FrameBuffer::next_frame`], which
//! leaves any trailing bytes buffered for the next call.

use bytes::BytesMut;

use super::wire_format::{Header, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header.
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForBody { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_body_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max body: [`DEFAULT_MAX_BODY_SIZE`].
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    /// Create a new frame buffer with custom max body size.
    pub fn with_max_body(max_body_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_body_size,
        }
    }

    /// Append raw bytes read from the connection.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if protocol violation (bad magic, body too large)
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let Some(header) = Header::decode(&self.buffer) else {
                        return Ok(None);
                    };
                    header.validate(self.max_body_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForBody { header };
                }

                State::WaitingForBody { header } => {
                    let needed = header.body_length as usize;
                    if self.buffer.len() < needed {
                        return Ok(None);
                    }

                    let header = *header;
                    let body = self.buffer.split_to(needed).freeze();
                    self.state = State::WaitingForHeader;

                    return Frame::from_parts(header, body).map(Some);
                }
            }
        }
    }

    /// Drain every complete frame currently buffered.
    #[cfg(test)]
    fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// True when no partial frame is pending.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::WaitingForHeader)
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;

    fn mutation(seq: u8) -> Frame {
        Frame::request(Opcode::Mutation)
            .with_opaque(1)
            .with_extras(vec![seq; 16])
            .with_key("doc")
            .with_body("payload")
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&mutation(1).encode()).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], mutation(1));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut bytes = Vec::new();
        for i in 0..3 {
            bytes.extend_from_slice(&mutation(i).encode());
        }

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], mutation(2));
    }

    #[test]
    fn test_fragmented_header_and_body() {
        let bytes = mutation(5).encode();
        let mut buffer = FrameBuffer::new();

        assert!(buffer.push(&bytes[..10]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        assert!(buffer.push(&bytes[10..30]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");
        assert!(!buffer.is_empty());

        let frames = buffer.push(&bytes[30..]).unwrap();
        assert_eq!(frames, vec![mutation(5)]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_by_byte() {
        let bytes = mutation(9).encode();
        let mut buffer = FrameBuffer::new();
        let mut frames = Vec::new();
        for b in bytes.iter() {
            frames.extend(buffer.push(&[*b]).unwrap());
        }
        assert_eq!(frames, vec![mutation(9)]);
    }

    #[test]
    fn test_body_too_large_rejected() {
        let frame = Frame::request(Opcode::Mutation).with_body(vec![0u8; 200]);
        let mut buffer = FrameBuffer::with_max_body(100);
        assert!(buffer.push(&frame.encode()).is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = Frame::request(Opcode::Noop).encode().to_vec();
        bytes[0] = 0x00;
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(&bytes).is_err());
    }
}
