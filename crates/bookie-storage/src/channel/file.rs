//! Random-access file handles underneath a buffered channel.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Positional file handle used by [`BufferedChannel`](super::BufferedChannel).
///
/// Writes append at the handle's current position and may be short.
/// Positional reads return `Ok(0)` at end-of-file.
pub trait FileChannel: Send {
    /// Writes a prefix of `buf` at the current position and advances it.
    ///
    /// Returns the number of bytes written, which may be less than `buf.len()`.
    ///
    /// # Errors
    ///
    /// Propagates device errors.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Reads into `buf` starting at `position` without moving the write position.
    ///
    /// # Errors
    ///
    /// Propagates device errors.
    fn read_at(&mut self, buf: &mut [u8], position: u64) -> io::Result<usize>;

    /// Returns the current write position.
    ///
    /// # Errors
    ///
    /// Propagates device errors.
    fn position(&mut self) -> io::Result<u64>;

    /// Returns the current file size.
    ///
    /// # Errors
    ///
    /// Propagates device errors.
    fn size(&mut self) -> io::Result<u64>;

    /// Makes written bytes durable. `metadata` also syncs file metadata.
    ///
    /// # Errors
    ///
    /// Propagates device errors.
    fn force(&mut self, metadata: bool) -> io::Result<()>;

    /// Closes the handle.
    ///
    /// # Errors
    ///
    /// Propagates device errors.
    fn close(&mut self) -> io::Result<()>;
}

/// [`FileChannel`] over a local file, opened for append.
pub struct LocalFileChannel {
    /// `None` once closed.
    file: Option<File>,
    path: PathBuf,
    position: u64,
}

impl LocalFileChannel {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// The write position starts at the end of any existing content.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let position = file.metadata()?.len();
        debug!(path = %path.display(), position, "Opened file channel");

        Ok(Self {
            file: Some(file),
            path,
            position,
        })
    }

    /// Returns the path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&self) -> io::Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "file channel is closed"))
    }
}

impl FileChannel for LocalFileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file()?;
        let n = file.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        read_at_offset(self.file()?, buf, position)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file()?;
        Ok(self.position)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    fn force(&mut self, metadata: bool) -> io::Result<()> {
        let file = self.file()?;
        if metadata {
            file.sync_all()
        } else {
            file.sync_data()
        }
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle closes it; a second close is a no-op
        if let Some(file) = self.file.take() {
            drop(file);
            debug!(path = %self.path.display(), "Closed file channel");
        }
        Ok(())
    }
}

#[cfg(unix)]
fn read_at_offset(file: &File, buf: &mut [u8], position: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, position)
}

#[cfg(windows)]
fn read_at_offset(file: &File, buf: &mut [u8], position: u64) -> io::Result<usize> {
    // Moves the OS cursor, which append-mode writes ignore
    std::os::windows::fs::FileExt::seek_read(file, buf, position)
}

impl std::fmt::Debug for LocalFileChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileChannel")
            .field("path", &self.path)
            .field("position", &self.position)
            .field("open", &self.file.is_some())
            .finish()
    }
}
