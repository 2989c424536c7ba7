//! Operation log (`logfs`).

use std::io::Write;
use std::path::Path;

use tracing::Level;

use crate::error::NodeError;
use crate::layer::Layer;
use crate::nodes::{check_creatable, opt_str};
use crate::registry::{NodeSchema, SchemaField};
use crate::validator::rules::LOG_LEVELS;
use crate::value::Config;
use crate::{CommitWriter, FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter, SharedFs};

/// Builds a [`LogFs`] over an underlying filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLayer {
    level: Level,
}

impl Default for LogLayer {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LogLayer {
    /// Log successful operations at `level`. Failures are always `warn`.
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Read `level`.
    pub fn from_config(config: &Config) -> Result<Self, NodeError> {
        let level = match opt_str(config, "level")? {
            None => Level::INFO,
            Some("trace") => Level::TRACE,
            Some("debug") => Level::DEBUG,
            Some("info") => Level::INFO,
            Some("warn") => Level::WARN,
            Some("error") => Level::ERROR,
            Some(other) => {
                return Err(NodeError::config(
                    "level",
                    format!("{other} is not one of: {}", LOG_LEVELS.join(", ")),
                ));
            }
        };
        Ok(Self { level })
    }
}

impl Layer<SharedFs> for LogLayer {
    type Backend = LogFs;

    fn layer(self, inner: SharedFs) -> LogFs {
        LogFs {
            inner,
            level: self.level,
        }
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("logfs", "Logs every filesystem operation").field(
        SchemaField::select("level", LOG_LEVELS)
            .default_value("info")
            .describe("Level for successful operations"),
    )
}

/// Filesystem wrapper logging each operation through `tracing`.
#[derive(Clone)]
pub struct LogFs {
    inner: SharedFs,
    level: Level,
}

impl std::fmt::Debug for LogFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFs")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl LogFs {
    fn log<T>(
        &self,
        operation: &'static str,
        path: &Path,
        result: Result<T, FsError>,
    ) -> Result<T, FsError> {
        let path = path.display();
        match &result {
            Err(error) => tracing::warn!(operation, %path, %error, "fs operation failed"),
            Ok(_) if self.level == Level::TRACE => tracing::trace!(operation, %path, "fs operation"),
            Ok(_) if self.level == Level::DEBUG => tracing::debug!(operation, %path, "fs operation"),
            Ok(_) if self.level == Level::INFO => tracing::info!(operation, %path, "fs operation"),
            Ok(_) if self.level == Level::WARN => tracing::warn!(operation, %path, "fs operation"),
            Ok(_) => tracing::error!(operation, %path, "fs operation"),
        }
        result
    }
}

impl FsRead for LogFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.log("read", path, self.inner.read(path))
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        self.log("metadata", path, self.inner.metadata(path))
    }
}

impl FsWrite for LogFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.log("write", path, self.inner.write(path, data))
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.log("remove_file", path, self.inner.remove_file(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.log("rename", from, self.inner.rename(from, to))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        self.log("open_write", path, check_creatable(&self.inner, path))?;
        let this = self.clone();
        Ok(Box::new(CommitWriter::new(path, move |p: &Path, data: &[u8]| {
            this.write(p, data)
        })))
    }
}

impl FsDir for LogFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        self.log("read_dir", path, self.inner.read_dir(path))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.log("create_dir", path, self.inner.create_dir(path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.log("create_dir_all", path, self.inner.create_dir_all(path))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.log("remove_dir", path, self.inner.remove_dir(path))
    }
}
