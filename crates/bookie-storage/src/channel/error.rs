//! Error type for buffered channel operations.

use std::io;

/// Error type for channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// IO error from the underlying file channel.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Caller passed an argument the channel cannot honor.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested range extends past the bytes written so far.
    #[error("Read of {length} bytes at position {position} past end of channel ({available} bytes written)")]
    ReadPastEnd {
        /// Requested start position.
        position: u64,
        /// Requested length.
        length: usize,
        /// Logical end of the channel at the time of the read.
        available: u64,
    },

    /// The file channel reported end-of-file inside the flushed region.
    #[error("Short read at position {position}: file ended before flushed data")]
    ShortRead {
        /// File position at which no more bytes were returned.
        position: u64,
    },

    /// A channel buffer could not be allocated.
    #[error("Failed to allocate {requested} byte channel buffer")]
    Allocation {
        /// Requested buffer size in bytes.
        requested: usize,
    },

    /// The channel has been closed.
    #[error("Channel is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChannelError::ReadPastEnd {
            position: 28,
            length: 3,
            available: 30,
        };
        assert_eq!(
            err.to_string(),
            "Read of 3 bytes at position 28 past end of channel (30 bytes written)"
        );
        assert_eq!(ChannelError::Closed.to_string(), "Channel is closed");
    }

    #[test]
    fn test_io_conversion() {
        let err: ChannelError = io::Error::new(io::ErrorKind::Other, "device gone").into();
        assert!(matches!(err, ChannelError::Io(ref e) if e.to_string() == "device gone"));
    }
}
