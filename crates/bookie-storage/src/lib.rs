//! # Bookie Storage
//!
//! Durability layer for the bookie write path: a write-buffered channel over
//! an append-only journal file, with fsync batching.
//!
//! ## Example
//!
//! ```rust
//! use bookie_storage::channel::{BufferedChannel, BufferedChannelConfig, MemoryFileChannel};
//!
//! let config = BufferedChannelConfig::with_write_capacity(4096);
//! let mut channel = BufferedChannel::new(MemoryFileChannel::new(), &config).unwrap();
//!
//! channel.write(b"entry").unwrap();
//!
//! // Still buffered, but readable
//! let mut dest = [0u8; 5];
//! channel.read(&mut dest, 0, 5).unwrap();
//! assert_eq!(&dest, b"entry");
//!
//! // Flush and fsync; returns the synced file position
//! assert_eq!(channel.force_write(true).unwrap(), 5);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Buffered journal channel - write batching, read-back and fsync control
pub mod channel;

// Re-export key types
pub use channel::{
    BufferedChannel, BufferedChannelConfig, ChannelError, FileChannel, LocalFileChannel,
};
