//! Write-buffered channel with fsync batching.
//!
//! ```text
//!   0         file_channel_position()             position()
//!   │                      │                          │
//!   ▼                      ▼                          ▼
//!   ├──────────────────────┼──────────────────────────┤
//!   │   flushed to file    │   buffered in memory     │
//!   │  (read-ahead cache)  │   (write buffer)         │
//!   ├──────────────────────┼──────────────────────────┤
//!        ◄── unpersisted bytes: flushed, not yet forced
//! ```

use std::io;

use tracing::{debug, info, warn};

use super::{BufferedChannelConfig, ChannelError, FileChannel};

/// Append-only channel that buffers writes in memory before handing them to a
/// [`FileChannel`].
///
/// Reads see every byte written so far, whether it is still buffered or
/// already flushed. When an unpersisted-bytes bound is configured, a write
/// that brings the bytes not yet forced to the bound triggers a
/// flush-and-force.
///
/// Not internally synchronized; a single owner serializes access.
pub struct BufferedChannel<C: FileChannel> {
    file: C,
    write_buffer: Vec<u8>,
    write_capacity: usize,
    /// File position of `write_buffer[0]`; everything before it is flushed.
    write_buffer_start: u64,
    /// Bytes ever handed to `write`, including the starting file position.
    position: u64,
    /// Flushed bytes not yet forced. Only maintained when the bound is > 0.
    unpersisted_bytes: u64,
    unpersisted_bytes_bound: u64,
    /// Window of flushed content starting at `read_buffer_start`.
    read_buffer: Vec<u8>,
    read_capacity: usize,
    read_buffer_start: u64,
    closed: bool,
}

impl<C: FileChannel> BufferedChannel<C> {
    /// Wraps `file`; logical and flushed positions start at its current
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidArgument`] for an invalid configuration,
    /// [`ChannelError::Allocation`] if the write buffer cannot be allocated, or
    /// an IO error from the file channel.
    pub fn new(mut file: C, config: &BufferedChannelConfig) -> Result<Self, ChannelError> {
        config.validate()?;

        let start = file.position()?;
        let write_buffer = allocate(config.write_capacity)?;
        let read_capacity = config.effective_read_capacity();

        debug!(
            start,
            write_capacity = config.write_capacity,
            read_capacity,
            unpersisted_bytes_bound = config.unpersisted_bytes_bound,
            "Created buffered channel"
        );

        Ok(Self {
            file,
            write_buffer,
            write_capacity: config.write_capacity,
            write_buffer_start: start,
            position: start,
            unpersisted_bytes: 0,
            unpersisted_bytes_bound: config.unpersisted_bytes_bound,
            read_buffer: Vec::new(),
            read_capacity,
            read_buffer_start: 0,
            closed: false,
        })
    }

    /// Appends `src` to the channel.
    ///
    /// A full write buffer is flushed before more bytes are copied in. With
    /// regular flushes enabled, reaching the unpersisted-bytes bound flushes
    /// and forces (without metadata) before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after close, or an IO error from a
    /// flush or force. Bytes copied before the error remain buffered.
    pub fn write(&mut self, mut src: &[u8]) -> Result<(), ChannelError> {
        self.ensure_open()?;

        while !src.is_empty() {
            let free = self.write_capacity.saturating_sub(self.write_buffer.len());
            if free == 0 {
                self.flush_write_buffer()?;
                continue;
            }
            let n = free.min(src.len());
            self.write_buffer.extend_from_slice(&src[..n]);
            self.position += n as u64;
            src = &src[n..];
        }

        if self.is_regular_flush_enabled() {
            let not_durable = self.unpersisted_bytes + self.write_buffer.len() as u64;
            if not_durable >= self.unpersisted_bytes_bound {
                debug!(
                    not_durable,
                    bound = self.unpersisted_bytes_bound,
                    "Unpersisted bytes bound reached, forcing channel"
                );
                self.force_write(false)?;
            }
        }
        Ok(())
    }

    /// Writes the whole write buffer to the file channel.
    ///
    /// Partial writes are retried until the buffer is drained. A no-op when
    /// nothing is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after close, or the IO error that
    /// stopped the flush. Bytes accepted by the file channel before the error
    /// are accounted as flushed.
    pub fn flush(&mut self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.flush_write_buffer()
    }

    /// Flushes, then syncs the file channel.
    ///
    /// Returns the file channel position at the time of the sync. Resets the
    /// unpersisted-bytes count when regular flushes are enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after close, or an IO error from the
    /// flush or the sync. A failed sync leaves the unpersisted count as is.
    pub fn force_write(&mut self, force_metadata: bool) -> Result<u64, ChannelError> {
        self.ensure_open()?;
        self.flush_write_buffer()?;

        let synced = self.file.position()?;
        self.file.force(force_metadata)?;
        if self.is_regular_flush_enabled() {
            self.unpersisted_bytes = 0;
        }
        Ok(synced)
    }

    /// Flushes and syncs regardless of the regular-flush setting.
    ///
    /// # Errors
    ///
    /// Same as [`force_write`](Self::force_write).
    pub fn flush_and_force_write(&mut self, force_metadata: bool) -> Result<u64, ChannelError> {
        self.flush()?;
        self.force_write(force_metadata)
    }

    /// Flushes and syncs if regular flushes are enabled, otherwise only
    /// flushes.
    ///
    /// # Errors
    ///
    /// Same as [`force_write`](Self::force_write).
    pub fn flush_and_force_write_if_regular_flush(
        &mut self,
        force_metadata: bool,
    ) -> Result<(), ChannelError> {
        if self.is_regular_flush_enabled() {
            self.flush_and_force_write(force_metadata)?;
        } else {
            self.flush()?;
        }
        Ok(())
    }

    /// Reads exactly `length` bytes starting at `position` into `dest`.
    ///
    /// Flushed bytes come from the file channel (through the read-ahead
    /// buffer); bytes still buffered come from the write buffer. Returns
    /// `length`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::InvalidArgument`] if `dest` is shorter than `length`
    /// - [`ChannelError::ReadPastEnd`] if the range extends past
    ///   [`position`](Self::position); nothing is
    ///   copied in that case
    /// - [`ChannelError::ShortRead`] if the file ends inside the flushed region
    /// - [`ChannelError::Closed`] after close
    pub fn read(
        &mut self,
        dest: &mut [u8],
        position: u64,
        length: usize,
    ) -> Result<usize, ChannelError> {
        self.ensure_open()?;
        if length > dest.len() {
            return Err(ChannelError::InvalidArgument(format!(
                "read length {length} exceeds destination capacity {}",
                dest.len()
            )));
        }

        let end = position
            .checked_add(length as u64)
            .filter(|end| *end <= self.position)
            .ok_or(ChannelError::ReadPastEnd {
                position,
                length,
                available: self.position,
            })?;

        let dest = &mut dest[..length];
        let mut copied = 0;

        if position < self.write_buffer_start {
            let flushed_len = to_usize(end.min(self.write_buffer_start) - position);
            self.read_flushed(&mut dest[..flushed_len], position)?;
            copied = flushed_len;
        }

        if copied < length {
            let offset = to_usize(position + copied as u64 - self.write_buffer_start);
            let remaining = length - copied;
            dest[copied..].copy_from_slice(&self.write_buffer[offset..offset + remaining]);
        }

        Ok(length)
    }

    /// Returns the logical end of the channel: every byte handed to `write`.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the flushed position: bytes handed to the file channel.
    #[must_use]
    pub fn file_channel_position(&self) -> u64 {
        self.write_buffer_start
    }

    /// Returns the size of the underlying file.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after close, or an IO error.
    pub fn size(&mut self) -> Result<u64, ChannelError> {
        self.ensure_open()?;
        Ok(self.file.size()?)
    }

    /// Returns bytes flushed since the last sync (0 unless regular flushes
    /// are enabled).
    #[must_use]
    pub fn unpersisted_bytes(&self) -> u64 {
        self.unpersisted_bytes
    }

    /// Returns the number of bytes waiting in the write buffer.
    #[must_use]
    pub fn num_bytes_in_write_buffer(&self) -> usize {
        self.write_buffer.len()
    }

    /// Returns `true` if an unpersisted-bytes bound is configured.
    #[must_use]
    pub fn is_regular_flush_enabled(&self) -> bool {
        self.unpersisted_bytes_bound > 0
    }

    /// Returns `true` once [`close`](Self::close) has succeeded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns a reference to the underlying file channel.
    #[must_use]
    pub fn get_ref(&self) -> &C {
        &self.file
    }

    /// Discards buffered bytes without flushing them.
    ///
    /// The logical position moves back to the flushed position.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after close.
    pub fn clear(&mut self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        if !self.write_buffer.is_empty() {
            warn!(
                discarded_bytes = self.write_buffer.len(),
                position = self.write_buffer_start,
                "Discarding unflushed channel bytes"
            );
        }
        self.write_buffer.clear();
        self.position = self.write_buffer_start;
        Ok(())
    }

    /// Releases the buffers and closes the file channel. Buffered bytes are
    /// not flushed and the logical position moves back to the flushed one.
    ///
    /// A second call after a successful close does nothing.
    ///
    /// # Errors
    ///
    /// Propagates the file channel's close error; the channel then stays open.
    pub fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }

        self.file.close()?;

        let dropped = self.write_buffer.len();
        self.write_buffer = Vec::new();
        self.read_buffer = Vec::new();
        self.position = self.write_buffer_start;
        self.closed = true;
        info!(position = self.position, dropped, "Closed buffered channel");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    /// Drains the write buffer into the file channel.
    fn flush_write_buffer(&mut self) -> Result<(), ChannelError> {
        let mut flushed = 0;
        let result = loop {
            if flushed == self.write_buffer.len() {
                break Ok(());
            }
            match self.file.write(&self.write_buffer[flushed..]) {
                Ok(0) => {
                    break Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "file channel accepted no bytes",
                    ))
                }
                Ok(n) => flushed += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };

        if flushed > 0 {
            self.write_buffer.drain(..flushed);
            self.write_buffer_start += flushed as u64;
            if self.is_regular_flush_enabled() {
                self.unpersisted_bytes += flushed as u64;
            }
        }
        result.map_err(ChannelError::from)
    }

    /// Fills `dest` with flushed bytes starting at `position`.
    fn read_flushed(&mut self, dest: &mut [u8], position: u64) -> Result<(), ChannelError> {
        // Large reads would only thrash the window
        if self.read_capacity == 0 || dest.len() >= self.read_capacity {
            return read_exact_at(&mut self.file, dest, position);
        }

        let mut filled = 0;
        while filled < dest.len() {
            let pos = position + filled as u64;
            if !self.read_buffer_contains(pos) {
                self.fill_read_buffer(pos)?;
            }
            let offset = to_usize(pos - self.read_buffer_start);
            let n = (self.read_buffer.len() - offset).min(dest.len() - filled);
            dest[filled..filled + n].copy_from_slice(&self.read_buffer[offset..offset + n]);
            filled += n;
        }
        Ok(())
    }

    fn read_buffer_contains(&self, position: u64) -> bool {
        position >= self.read_buffer_start
            && position < self.read_buffer_start + self.read_buffer.len() as u64
    }

    /// Loads a window of flushed bytes covering `position`.
    fn fill_read_buffer(&mut self, position: u64) -> Result<(), ChannelError> {
        let capacity = self.read_capacity as u64;
        let flushed_end = self.write_buffer_start;
        let start = if position + capacity > flushed_end {
            flushed_end.saturating_sub(capacity)
        } else {
            position
        };
        let len = to_usize((flushed_end - start).min(capacity));

        if self.read_buffer.capacity() < self.read_capacity {
            self.read_buffer = allocate(self.read_capacity)?;
        }
        self.read_buffer.resize(len, 0);

        if let Err(e) = read_exact_at(&mut self.file, &mut self.read_buffer, start) {
            self.read_buffer.clear();
            return Err(e);
        }
        self.read_buffer_start = start;
        Ok(())
    }
}

impl<C: FileChannel + std::fmt::Debug> std::fmt::Debug for BufferedChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedChannel")
            .field("file", &self.file)
            .field("position", &self.position)
            .field("file_channel_position", &self.write_buffer_start)
            .field("buffered", &self.write_buffer.len())
            .field("unpersisted_bytes", &self.unpersisted_bytes)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Reads until `dest` is full; end-of-file first is a short read.
fn read_exact_at<C: FileChannel>(
    file: &mut C,
    dest: &mut [u8],
    position: u64,
) -> Result<(), ChannelError> {
    let mut filled = 0;
    while filled < dest.len() {
        let at = position + filled as u64;
        match file.read_at(&mut dest[filled..], at) {
            Ok(0) => return Err(ChannelError::ShortRead { position: at }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn allocate(capacity: usize) -> Result<Vec<u8>, ChannelError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .map_err(|_| ChannelError::Allocation {
            requested: capacity,
        })?;
    Ok(buffer)
}

/// Narrows an in-buffer distance, bounded by a buffer length or read length.
#[allow(clippy::cast_possible_truncation)]
#[inline]
fn to_usize(n: u64) -> usize {
    n as usize
}
