//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the memcached binary framing UPR rides on:
//! - 24-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - Opcode and status enumerations

mod frame;
mod frame_buffer;
mod opcode;
mod status;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use opcode::Opcode;
pub use status::Status;
pub use wire_format::{Header, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE, MAGIC_REQUEST, MAGIC_RESPONSE};
