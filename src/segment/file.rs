//! Segment file
//!
//! Append-only file with positioned reads. Reads never move a shared cursor,
//! so any number of readers can use one handle while the writer appends.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, SegKvError};

/// An append-only segment file
///
/// ## Concurrency:
/// - `read_at`/`size`: lock-free, safe from any thread
/// - `append`/`truncate`: NOT internally synchronized; callers hold the
///   engine write lock
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    file: File,
    /// Logical end of file; the append cursor and the replay scan bound
    len: AtomicU64,
    writable: bool,
}

impl Segment {
    /// Create a new, empty segment for appending
    ///
    /// Fails if a file already exists at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: AtomicU64::new(0),
            writable: true,
        })
    }

    /// Open an existing sealed segment for random reads
    pub fn open_readonly(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: AtomicU64::new(len),
            writable: false,
        })
    }

    /// Append `bytes` at the current end of the segment
    ///
    /// Returns the offset the write began at. On failure the segment is
    /// rolled back to its previous length.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        if !self.writable {
            return Err(SegKvError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("segment {} is sealed", self.path.display()),
            )));
        }

        let offset = self.len.load(Ordering::Acquire);
        if bytes.is_empty() {
            return Ok(offset);
        }

        if let Err(e) = write_all_at(&self.file, bytes, offset) {
            if let Err(trunc) = self.file.set_len(offset) {
                tracing::warn!(
                    segment = %self.path.display(),
                    offset,
                    error = %trunc,
                    "failed to roll back partial append"
                );
            }
            return Err(e.into());
        }

        self.len.store(offset + bytes.len() as u64, Ordering::Release);
        Ok(offset)
    }

    /// Read exactly `len` bytes at `offset`
    ///
    /// A range past the logical end is a corrupt record, not an I/O error.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let size = self.size();
        let end = offset.saturating_add(len as u64);
        if offset > size || end > size {
            return Err(SegKvError::corrupt(
                &self.path,
                offset,
                format!("short read: wanted {} bytes, segment ends at {}", len, size),
            ));
        }

        let mut buffer = vec![0u8; len];
        if len == 0 {
            return Ok(buffer);
        }

        match read_exact_at(&self.file, &mut buffer, offset) {
            Ok(()) => Ok(buffer),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SegKvError::corrupt(
                &self.path,
                offset,
                format!("short read: wanted {} bytes", len),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Shrink the segment to `new_len` bytes
    pub fn truncate(&self, new_len: u64) -> Result<()> {
        let size = self.size();
        if new_len > size {
            return Err(SegKvError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_len, size
                ),
            )));
        }

        self.file.set_len(new_len)?;
        self.len.store(new_len, Ordering::Release);
        Ok(())
    }

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<()> {
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Current logical end-of-file offset
    pub fn size(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle accepts appends
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

// =============================================================================
// Positioned I/O
// =============================================================================

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
