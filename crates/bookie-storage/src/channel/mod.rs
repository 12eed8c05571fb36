//! # Buffered Channel
//!
//! Durable append path for the bookie journal.
//!
//! A [`BufferedChannel`] batches appends in a write buffer, hands full buffers
//! to a [`FileChannel`], and optionally forces the file once a configured
//! number of bytes is not yet durable. Reads are served from whichever side
//! of the flush boundary holds the requested bytes.

mod buffered;
mod config;
mod error;
mod file;
mod memory;

pub use buffered::BufferedChannel;
pub use config::{BufferedChannelConfig, DEFAULT_UNPERSISTED_BYTES_BOUND, DEFAULT_WRITE_CAPACITY};
pub use error::ChannelError;
pub use file::{FileChannel, LocalFileChannel};
pub use memory::MemoryFileChannel;
