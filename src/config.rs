//! Feed configuration.
//!
//! Usually built through [`FeedBuilder`](crate::FeedBuilder); also loadable
//! from JSON so a deployment can keep feed settings next to its other config.
//!
//! ```
//! use upr_client::FeedConfig;
//!
//! let config = FeedConfig::from_json(r#"{ "name": "indexer", "buffer_size": 1048576 }"#).unwrap();
//! assert_eq!(config.name, "indexer");
//! assert_eq!(config.event_capacity, 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, UprError};
use crate::protocol::DEFAULT_MAX_BODY_SIZE;
use crate::writer::DEFAULT_TRANSMIT_CAPACITY;

/// Default connection name sent with Open.
pub const DEFAULT_NAME: &str = "upr-client";

/// Default event queue capacity. One slot: the runtime loop waits for the
/// consumer before reading the next frame.
pub const DEFAULT_EVENT_CAPACITY: usize = 1;

/// Settings for one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Connection name sent with Open.
    pub name: String,
    /// Sequence number sent with Open.
    pub sequence: u32,
    /// Flow-control window in bytes. 0 leaves the producer default.
    pub buffer_size: u32,
    /// Capacity of the consumer event queue.
    pub event_capacity: usize,
    /// Capacity of the outbound frame queue.
    pub transmit_capacity: usize,
    /// Largest frame body accepted from the producer.
    pub max_body_size: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            sequence: 0,
            buffer_size: 0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            transmit_capacity: DEFAULT_TRANSMIT_CAPACITY,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl FeedConfig {
    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FeedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(UprError::Config("name must not be empty".to_string()));
        }
        if self.name.len() > u16::MAX as usize {
            return Err(UprError::Config("name longer than a key".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(UprError::Config("event_capacity must be at least 1".to_string()));
        }
        if self.transmit_capacity == 0 {
            return Err(UprError::Config(
                "transmit_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_body_size == 0 {
            return Err(UprError::Config("max_body_size must be positive".to_string()));
        }
        Ok(())
    }
}
