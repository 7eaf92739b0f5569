//! Frame reader over the raw (hijacked) read half of a connection.
//!
//! Once streaming begins, nothing pairs requests with responses any more:
//! the runtime loop pulls whatever frame arrives next and classifies it.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, UprError};
use crate::protocol::{Frame, FrameBuffer, DEFAULT_MAX_BODY_SIZE};

/// Size of a single socket read.
const READ_CHUNK: usize = 64 * 1024;

/// Reads complete frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_body(reader, DEFAULT_MAX_BODY_SIZE)
    }

    pub fn with_max_body(reader: R, max_body_size: u32) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::with_max_body(max_body_size),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Wait for the next complete frame.
    ///
    /// Cancel safe: bytes already read stay buffered when the future is
    /// dropped at the read point.
    ///
    /// # Errors
    ///
    /// - [`UprError::ConnectionClosed`] on EOF between frames
    /// - I/O `UnexpectedEof` on EOF inside a frame
    /// - protocol errors from header validation
    pub async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.buffer.next_frame()? {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Err(UprError::ConnectionClosed);
                }
                return Err(UprError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )));
            }
            self.buffer.extend(&self.chunk[..n]);
        }
    }
}
