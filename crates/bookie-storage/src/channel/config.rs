//! Buffered channel configuration.

use serde::{Deserialize, Serialize};

use super::ChannelError;

/// Default write buffer capacity (64 KiB).
pub const DEFAULT_WRITE_CAPACITY: usize = 64 * 1024;

/// Default unpersisted-bytes bound. Zero disables regular flushes.
pub const DEFAULT_UNPERSISTED_BYTES_BOUND: u64 = 0;

/// Configuration for a [`BufferedChannel`](super::BufferedChannel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferedChannelConfig {
    /// Capacity of the in-memory write buffer in bytes.
    pub write_capacity: usize,

    /// Capacity of the read-ahead buffer for flushed content.
    ///
    /// `None` uses the write capacity; `Some(0)` disables read-ahead.
    pub read_capacity: Option<usize>,

    /// Bytes that may be flushed or buffered without an fsync before a
    /// write triggers a flush-and-force. Zero disables the mechanism.
    pub unpersisted_bytes_bound: u64,
}

impl Default for BufferedChannelConfig {
    fn default() -> Self {
        Self {
            write_capacity: DEFAULT_WRITE_CAPACITY,
            read_capacity: None,
            unpersisted_bytes_bound: DEFAULT_UNPERSISTED_BYTES_BOUND,
        }
    }
}

impl BufferedChannelConfig {
    /// Creates a configuration with the given write capacity.
    #[must_use]
    pub fn with_write_capacity(write_capacity: usize) -> Self {
        Self {
            write_capacity,
            ..Default::default()
        }
    }

    /// Sets the read-ahead capacity (0 disables read-ahead).
    #[must_use]
    pub fn read_capacity(mut self, read_capacity: usize) -> Self {
        self.read_capacity = Some(read_capacity);
        self
    }

    /// Sets the unpersisted-bytes bound (0 disables regular flushes).
    #[must_use]
    pub fn unpersisted_bytes_bound(mut self, bound: u64) -> Self {
        self.unpersisted_bytes_bound = bound;
        self
    }

    /// Returns the read-ahead capacity in effect.
    #[must_use]
    pub fn effective_read_capacity(&self) -> usize {
        self.read_capacity.unwrap_or(self.write_capacity)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidArgument`] for a zero write capacity.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.write_capacity == 0 {
            return Err(ChannelError::InvalidArgument(
                "write capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
