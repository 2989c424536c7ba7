//! Retry wrapper (`retryfs`).

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::error::NodeError;
use crate::layer::Layer;
use crate::nodes::{check_creatable, opt_quantity};
use crate::registry::{FieldKind, NodeSchema, SchemaField};
use crate::value::Config;
use crate::{CommitWriter, FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter, SharedFs};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 100;

/// Builds a [`RetryFs`] over an underlying filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLayer {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryLayer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::from_millis(DEFAULT_BACKOFF_MS))
    }
}

impl RetryLayer {
    /// Try each operation up to `max_attempts` times (at least once),
    /// sleeping `backoff * n` after the n-th failure.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Read `maxAttempts` and `backoffMs`.
    pub fn from_config(config: &Config) -> Result<Self, NodeError> {
        let max_attempts = match opt_quantity(config, "maxAttempts")? {
            None => DEFAULT_MAX_ATTEMPTS,
            Some(0) => return Err(NodeError::config("maxAttempts", "must be at least 1")),
            Some(n) => u32::try_from(n)
                .map_err(|_| NodeError::config("maxAttempts", "is too large"))?,
        };
        let backoff_ms = opt_quantity(config, "backoffMs")?.unwrap_or(DEFAULT_BACKOFF_MS);
        Ok(Self::new(max_attempts, Duration::from_millis(backoff_ms)))
    }
}

impl Layer<SharedFs> for RetryLayer {
    type Backend = RetryFs;

    fn layer(self, inner: SharedFs) -> RetryFs {
        RetryFs {
            inner,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        }
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("retryfs", "Retries operations that fail with transient errors")
        .field(
            SchemaField::new("maxAttempts", FieldKind::Int)
                .default_value(DEFAULT_MAX_ATTEMPTS as i64)
                .describe("Attempts per operation, first one included"),
        )
        .field(
            SchemaField::new("backoffMs", FieldKind::Int)
                .default_value(DEFAULT_BACKOFF_MS as i64)
                .describe("Delay unit between attempts, grows linearly"),
        )
}

/// Filesystem wrapper retrying transient failures.
///
/// Only [`FsError::is_transient`] errors are retried. The last error is
/// returned once attempts run out.
#[derive(Clone)]
pub struct RetryFs {
    inner: SharedFs,
    max_attempts: u32,
    backoff: Duration,
}

impl std::fmt::Debug for RetryFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryFs")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RetryFs {
    /// Pause before retry number `attempt`, growing linearly and capped at
    /// [`Duration::MAX`].
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }

    fn run<T>(
        &self,
        operation: &'static str,
        path: &Path,
        mut f: impl FnMut() -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let mut attempt = 1;
        loop {
            match f() {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation,
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(self.delay(attempt));
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl FsRead for RetryFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.run("read", path, || self.inner.read(path))
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        self.run("metadata", path, || self.inner.metadata(path))
    }
}

impl FsWrite for RetryFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.run("write", path, || self.inner.write(path, data))
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.run("remove_file", path, || self.inner.remove_file(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.run("rename", from, || self.inner.rename(from, to))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        self.run("open_write", path, || check_creatable(&self.inner, path))?;
        let this = self.clone();
        Ok(Box::new(CommitWriter::new(path, move |p: &Path, data: &[u8]| {
            this.write(p, data)
        })))
    }
}

impl FsDir for RetryFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        self.run("read_dir", path, || self.inner.read_dir(path))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.run("create_dir", path, || self.inner.create_dir(path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.run("create_dir_all", path, || self.inner.create_dir_all(path))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.run("remove_dir", path, || self.inner.remove_dir(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerExt;
    use crate::nodes::testing::Flaky;
    use crate::ConfigValue;
    use std::sync::Arc;

    fn retrying(failures: usize, attempts: u32) -> (Arc<Flaky>, RetryFs) {
        let flaky = Arc::new(Flaky::new(failures));
        let inner: SharedFs = flaky.clone();
        (flaky, inner.layer(RetryLayer::new(attempts, Duration::ZERO)))
    }

    #[test]
    fn recovers_from_transient_failures() {
        let (flaky, fs) = retrying(2, 3);
        fs.write(Path::new("/a"), b"ok").unwrap();
        assert_eq!(flaky.calls(), 3);
        assert_eq!(fs.read(Path::new("/a")).unwrap(), b"ok");
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let (flaky, fs) = retrying(5, 2);
        let err = fs.write(Path::new("/a"), b"x").unwrap_err();
        assert!(matches!(err, FsError::Backend(_)));
        assert_eq!(flaky.calls(), 2);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let (flaky, fs) = retrying(0, 5);
        assert!(matches!(
            fs.read(Path::new("/missing")),
            Err(FsError::NotFound { .. })
        ));
        assert_eq!(flaky.calls(), 1);
    }

    #[test]
    fn from_config() {
        let mut config = Config::new();
        assert_eq!(RetryLayer::from_config(&config).unwrap(), RetryLayer::default());

        config.insert("maxAttempts".into(), ConfigValue::Float(4.0));
        config.insert("backoffMs".into(), ConfigValue::Int(0));
        assert_eq!(
            RetryLayer::from_config(&config).unwrap(),
            RetryLayer::new(4, Duration::ZERO)
        );

        config.insert("maxAttempts".into(), ConfigValue::Int(0));
        assert!(RetryLayer::from_config(&config).is_err());
    }

    #[test]
    fn open_write_checks_the_path_up_front() {
        let (_, fs) = retrying(0, 3);
        assert!(matches!(
            fs.open_write(Path::new("/nodir/f")),
            Err(FsError::NotFound { .. })
        ));
    }

    #[test]
    fn open_write_check_is_retried() {
        let (flaky, fs) = retrying(1, 3);
        {
            let mut w = fs.open_write(Path::new("/f")).unwrap();
            w.write_all(b"ok").unwrap();
        }
        assert!(flaky.calls() >= 2);
        assert_eq!(fs.read(Path::new("/f")).unwrap(), b"ok");
    }

    #[test]
    fn delay_saturates() {
        let inner: SharedFs = Arc::new(Flaky::new(0));
        let fs = inner.layer(RetryLayer::new(3, Duration::MAX));
        assert_eq!(fs.delay(1), Duration::MAX);
        assert_eq!(fs.delay(3), Duration::MAX);

        let (_, fs) = retrying(0, 3);
        assert_eq!(fs.delay(2), Duration::ZERO);
        let inner: SharedFs = Arc::new(Flaky::new(0));
        let fs = inner.layer(RetryLayer::new(3, Duration::from_millis(10)));
        assert_eq!(fs.delay(3), Duration::from_millis(30));
    }
}
