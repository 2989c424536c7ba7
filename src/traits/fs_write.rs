//! Write operations for composed filesystems.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::FsError;

/// Write operations for a filesystem.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods use `&self` to allow
/// concurrent access.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsWrite`.
pub trait FsWrite: Send + Sync {
    /// Write data to a file (creates if not exists, truncates if exists).
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the parent directory does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Remove a file.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    fn remove_file(&self, path: &Path) -> Result<(), FsError>;

    /// Rename/move a file.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the source path does not exist
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Create (or truncate) a file and return a writer for it.
    ///
    /// Data is visible to readers once the writer is flushed or dropped.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the parent directory does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError>;
}

type Commit = Box<dyn FnMut(&Path, &[u8]) -> Result<(), FsError> + Send>;

/// Buffered writer that hands its whole contents to a commit function.
///
/// The buffer is committed on every [`flush`](Write::flush) and once more on
/// drop if anything was written since the last commit. A failed commit on
/// drop cannot be reported to the caller and is logged instead.
///
/// ```rust
/// use fscomposer::CommitWriter;
/// use std::io::Write;
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let mut w = CommitWriter::new("/a.txt", move |_path, data: &[u8]| {
///     *sink.lock().unwrap() = data.to_vec();
///     Ok(())
/// });
/// w.write_all(b"hello").unwrap();
/// drop(w);
/// assert_eq!(&*seen.lock().unwrap(), b"hello");
/// ```
pub struct CommitWriter {
    path: PathBuf,
    buf: Vec<u8>,
    dirty: bool,
    commit: Commit,
}

impl CommitWriter {
    /// Create a writer for `path` whose contents are passed to `commit`.
    pub fn new<F>(path: impl Into<PathBuf>, commit: F) -> Self
    where
        F: FnMut(&Path, &[u8]) -> Result<(), FsError> + Send + 'static,
    {
        Self {
            path: path.into(),
            buf: Vec::new(),
            // An empty file is still created when nothing is written.
            dirty: true,
            commit: Box::new(commit),
        }
    }

    fn commit(&mut self) -> Result<(), FsError> {
        (self.commit)(&self.path, &self.buf)?;
        self.dirty = false;
        Ok(())
    }
}

impl Write for CommitWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.dirty = true;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            self.commit()?;
        }
        Ok(())
    }
}

impl Drop for CommitWriter {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.commit() {
                tracing::warn!(path = %self.path.display(), error = %e, "dropped writer failed to commit");
            }
        }
    }
}
