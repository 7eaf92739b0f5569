//! Transport module - producer connection and frame reading.
//!
//! Provides:
//! - TCP connect to a producer node
//! - A cancel-safe frame reader over any `AsyncRead`

mod reader;
mod tcp;

pub use reader::FrameReader;
pub use tcp::connect;
