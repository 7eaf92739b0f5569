//! # upr-client
//!
//! Rust client for the UPR change-feed protocol.
//!
//! A feed opens a consumer session on a producer node, requests one stream
//! per partition and turns the frames the producer pushes back into typed
//! [`Event`]s: mutations, deletions, expirations, snapshot markers, stream
//! ends. Rollbacks are handled internally and flow control is acknowledged
//! as events are consumed.
//!
//! ## Architecture
//!
//! - **Handshake** (before start): Open, flow-control window, failover logs
//! - **Runtime loop** (one task): reads frames, tracks partitions, emits events
//! - **Transmit worker** (one task): the only writer on the connection
//!
//! ## Example
//!
//! ```ignore
//! use upr_client::{FeedBuilder, StreamRequest};
//!
//! #[tokio::main]
//! async fn main() -> upr_client::Result<()> {
//!     let mut feed = FeedBuilder::new()
//!         .name("indexer")
//!         .connect("127.0.0.1:11210")
//!         .await?;
//!
//!     feed.request_stream(StreamRequest::new(0, 0, 0, u64::MAX)).await?;
//!
//!     let mut handle = feed.start();
//!     while let Some(event) = handle.recv().await {
//!         println!("{}: {:?}", event, event.key);
//!     }
//!     handle.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod handshake;
pub mod observer;
pub mod protocol;
pub mod stream;
pub mod transport;
pub mod writer;

mod feed;
mod runtime;

pub use config::FeedConfig;
pub use error::{Result, UprError};
pub use event::{Event, FailoverEntry, FailoverLog, SnapshotType};
pub use feed::{Feed, FeedBuilder, FeedHandle};
pub use observer::{FeedObserver, FeedStats, NoopObserver};
pub use protocol::{Opcode, Status};
pub use runtime::buffer_ack_frame;
pub use stream::{StreamRequest, StreamState};
