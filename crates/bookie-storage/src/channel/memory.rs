//! In-memory [`FileChannel`] with call accounting and fault injection.

use std::io;

use super::FileChannel;

/// Volatile [`FileChannel`] backed by a `Vec<u8>`.
///
/// Records every force and close so callers can check durability calls,
/// and can cap the bytes moved per call or fail `force`/`close` on demand.
#[derive(Debug, Default)]
pub struct MemoryFileChannel {
    data: Vec<u8>,
    max_write: Option<usize>,
    max_read: Option<usize>,
    fail_force: bool,
    fail_close: bool,
    write_calls: usize,
    read_calls: usize,
    force_calls: Vec<bool>,
    close_calls: usize,
}

impl MemoryFileChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel positioned after `data`.
    #[must_use]
    pub fn with_contents(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Accepts at most `max` bytes per `write` call.
    #[must_use]
    pub fn max_write(mut self, max: usize) -> Self {
        self.max_write = Some(max);
        self
    }

    /// Returns at most `max` bytes per `read_at` call.
    #[must_use]
    pub fn max_read(mut self, max: usize) -> Self {
        self.max_read = Some(max);
        self
    }

    /// Makes every `force` fail.
    #[must_use]
    pub fn fail_force(mut self) -> Self {
        self.fail_force = true;
        self
    }

    /// Makes every `close` fail.
    #[must_use]
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of `write` calls.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    /// Returns the number of `read_at` calls.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.read_calls
    }

    /// Returns the metadata flag of every `force` call, in order.
    #[must_use]
    pub fn force_calls(&self) -> &[bool] {
        &self.force_calls
    }

    /// Returns the number of `close` calls.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls
    }
}

impl FileChannel for MemoryFileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;
        let n = self.max_write.map_or(buf.len(), |max| max.min(buf.len()));
        self.data.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        self.read_calls += 1;
        let Ok(start) = usize::try_from(position) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let available = self.data.len() - start;
        let n = self
            .max_read
            .map_or(buf.len(), |max| max.min(buf.len()))
            .min(available);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn force(&mut self, metadata: bool) -> io::Result<()> {
        self.force_calls.push(metadata);
        if self.fail_force {
            return Err(io::Error::new(io::ErrorKind::Other, "injected force failure"));
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.close_calls += 1;
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "injected close failure"));
        }
        Ok(())
    }
}
