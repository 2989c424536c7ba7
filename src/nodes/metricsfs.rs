//! Operation counters (`metricsfs`).

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::layer::Layer;
use crate::nodes::check_creatable;
use crate::registry::NodeSchema;
use crate::{CommitWriter, FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter, SharedFs};

/// Builds a [`MetricsFs`] over an underlying filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl Layer<SharedFs> for MetricsLayer {
    type Backend = MetricsFs;

    fn layer(self, inner: SharedFs) -> MetricsFs {
        MetricsFs {
            inner,
            counters: Arc::default(),
        }
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("metricsfs", "Counts operations, errors and bytes transferred")
}

/// Point-in-time copy of a [`MetricsFs`]'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    /// Successful and failed `read` calls.
    pub reads: u64,
    /// `write` calls, streamed writes included.
    pub writes: u64,
    /// `metadata` calls.
    pub stats: u64,
    /// Directory listings.
    pub listings: u64,
    /// File and directory removals, renames and directory creations.
    pub mutations: u64,
    /// Operations that returned an error.
    pub errors: u64,
    /// Bytes returned by successful reads.
    pub bytes_read: u64,
    /// Bytes accepted by successful writes.
    pub bytes_written: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    stats: AtomicU64,
    listings: AtomicU64,
    mutations: AtomicU64,
    errors: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

/// Filesystem wrapper counting what passes through it.
///
/// Clones share counters.
#[derive(Clone)]
pub struct MetricsFs {
    inner: SharedFs,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for MetricsFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsFs")
            .field("metrics", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl MetricsFs {
    /// Current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        MetricsSnapshot {
            reads: load(&c.reads),
            writes: load(&c.writes),
            stats: load(&c.stats),
            listings: load(&c.listings),
            mutations: load(&c.mutations),
            errors: load(&c.errors),
            bytes_read: load(&c.bytes_read),
            bytes_written: load(&c.bytes_written),
        }
    }

    fn count<T>(&self, counter: &AtomicU64, result: Result<T, FsError>) -> Result<T, FsError> {
        counter.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl FsRead for MetricsFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let data = self.count(&self.counters.reads, self.inner.read(path))?;
        self.counters
            .bytes_read
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data)
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        self.count(&self.counters.stats, self.inner.metadata(path))
    }
}

impl FsWrite for MetricsFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.count(&self.counters.writes, self.inner.write(path, data))?;
        self.counters
            .bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.count(&self.counters.mutations, self.inner.remove_file(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.count(&self.counters.mutations, self.inner.rename(from, to))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        if let Err(e) = check_creatable(&self.inner, path) {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        let this = self.clone();
        Ok(Box::new(CommitWriter::new(path, move |p: &Path, data: &[u8]| {
            this.write(p, data)
        })))
    }
}

impl FsDir for MetricsFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        self.count(&self.counters.listings, self.inner.read_dir(path))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.count(&self.counters.mutations, self.inner.create_dir(path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.count(&self.counters.mutations, self.inner.create_dir_all(path))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.count(&self.counters.mutations, self.inner.remove_dir(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerExt;
    use crate::nodes::MemFs;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_operations_and_bytes() {
        let mem: SharedFs = Arc::new(MemFs::new());
        let fs = mem.layer(MetricsLayer);

        fs.create_dir(Path::new("/d")).unwrap();
        fs.write(Path::new("/d/f"), b"hello").unwrap();
        fs.read(Path::new("/d/f")).unwrap();
        fs.read(Path::new("/missing")).unwrap_err();
        fs.metadata(Path::new("/d")).unwrap();
        fs.read_dir(Path::new("/d")).unwrap();
        {
            let mut w = fs.open_write(Path::new("/d/g")).unwrap();
            w.write_all(b"abc").unwrap();
        }

        assert_eq!(
            fs.snapshot(),
            MetricsSnapshot {
                reads: 2,
                writes: 2,
                stats: 1,
                listings: 1,
                mutations: 1,
                errors: 1,
                bytes_read: 5,
                bytes_written: 8,
            }
        );
    }

    #[test]
    fn clones_share_counters() {
        let mem: SharedFs = Arc::new(MemFs::new());
        let fs = mem.layer(MetricsLayer);
        let other = fs.clone();
        other.write(Path::new("/x"), b"1").unwrap();
        assert_eq!(fs.snapshot().writes, 1);
    }

    #[test]
    fn failed_open_write_counts_as_error() {
        let mem: SharedFs = Arc::new(MemFs::new());
        let fs = mem.layer(MetricsLayer);
        assert!(matches!(
            fs.open_write(Path::new("/nodir/f")),
            Err(FsError::NotFound { .. })
        ));
        let snapshot = fs.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.writes, 0);
    }
}
