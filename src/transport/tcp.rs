//! TCP connection to a producer node.
//!
//! # Example
//!
//! ```ignore
//! use upr_client::transport::connect;
//!
//! let stream = connect("127.0.0.1:11210").await?;
//! ```

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;

/// Open a TCP connection with Nagle disabled.
pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    tracing::debug!(peer = ?stream.peer_addr().ok(), "connected to producer");
    Ok(stream)
}
