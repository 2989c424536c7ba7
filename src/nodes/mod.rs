//! Built-in node types.
//!
//! | Type | Category | Filesystem |
//! |------|----------|------------|
//! | `memfs` | backend | [`MemFs`] |
//! | `osfs` | backend | [`OsFs`] |
//! | `cachefs` | wrapper | [`CacheFs`] |
//! | `encryptfs` | wrapper | [`EncryptFs`] |
//! | `retryfs` | wrapper | [`RetryFs`] |
//! | `metricsfs` | wrapper | [`MetricsFs`] |
//! | `logfs` | wrapper | [`LogFs`] |
//! | `switchfs` | multiplexer | [`SwitchFs`] |
//! | `unionfs` | multiplexer | [`UnionFs`] |
//!
//! Wrappers are [`Layer`]s over a [`SharedFs`], so they can also be stacked
//! by hand without a specification:
//!
//! ```rust
//! use fscomposer::nodes::{CacheLayer, MemFs, MetricsLayer};
//! use fscomposer::{FsRead, FsWrite, LayerExt, SharedFs};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let mem: SharedFs = Arc::new(MemFs::new());
//! let metrics = Arc::new(mem.layer(MetricsLayer::default()));
//! let stack: SharedFs = metrics.clone();
//! let cached = stack.layer(CacheLayer::default());
//!
//! cached.write(Path::new("/f"), b"x")?;
//! cached.read(Path::new("/f"))?;
//! cached.read(Path::new("/f"))?;
//! assert_eq!(metrics.snapshot().reads, 1);
//! # Ok::<(), fscomposer::FsError>(())
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::error::NodeError;
use crate::layer::{Layer, LayerExt};
use crate::registry::{Registry, Resolver};
use crate::value::{Config, ConfigValue};
use crate::{Fs, FsError, SharedFs};

mod cachefs;
mod encryptfs;
mod logfs;
pub(crate) mod memfs;
mod metricsfs;
mod osfs;
mod retryfs;
mod switchfs;
mod unionfs;

pub use cachefs::{CacheFs, CacheLayer, CachePolicy, CacheStats};
pub use encryptfs::{EncryptFs, EncryptLayer};
pub use logfs::{LogFs, LogLayer};
pub use memfs::MemFs;
pub use metricsfs::{MetricsFs, MetricsLayer, MetricsSnapshot};
pub use osfs::OsFs;
pub use retryfs::{RetryFs, RetryLayer};
pub use switchfs::{Route, SwitchFs};
pub use unionfs::UnionFs;

/// Register every built-in node type in `registry`.
pub fn register_builtins(registry: &Registry) {
    registry.register(
        "memfs",
        |_: &Config, _: Option<SharedFs>, _: &mut dyn Resolver| {
            let fs: SharedFs = Arc::new(MemFs::new());
            Ok(fs)
        },
        memfs::schema(),
    );
    registry.register(
        "osfs",
        |config: &Config, _: Option<SharedFs>, _: &mut dyn Resolver| {
            let root = opt_str(config, "root")?
                .filter(|r| !r.is_empty())
                .ok_or_else(|| NodeError::config("root", "is required"))?;
            let fs: SharedFs = Arc::new(OsFs::new(root)?);
            Ok(fs)
        },
        osfs::schema(),
    );
    registry.register(
        "cachefs",
        |config: &Config, fs: Option<SharedFs>, _: &mut dyn Resolver| {
            wrap(fs, CacheLayer::from_config(config)?)
        },
        cachefs::schema(),
    );
    registry.register(
        "encryptfs",
        |config: &Config, fs: Option<SharedFs>, _: &mut dyn Resolver| {
            wrap(fs, EncryptLayer::from_config(config)?)
        },
        encryptfs::schema(),
    );
    registry.register(
        "retryfs",
        |config: &Config, fs: Option<SharedFs>, _: &mut dyn Resolver| {
            wrap(fs, RetryLayer::from_config(config)?)
        },
        retryfs::schema(),
    );
    registry.register(
        "metricsfs",
        |_: &Config, fs: Option<SharedFs>, _: &mut dyn Resolver| {
            wrap(fs, MetricsLayer::default())
        },
        metricsfs::schema(),
    );
    registry.register(
        "logfs",
        |config: &Config, fs: Option<SharedFs>, _: &mut dyn Resolver| {
            wrap(fs, LogLayer::from_config(config)?)
        },
        logfs::schema(),
    );
    registry.register(
        "switchfs",
        |config: &Config, _: Option<SharedFs>, resolver: &mut dyn Resolver| {
            let fs: SharedFs = Arc::new(SwitchFs::from_config(config, resolver)?);
            Ok(fs)
        },
        switchfs::schema(),
    );
    registry.register(
        "unionfs",
        |config: &Config, _: Option<SharedFs>, resolver: &mut dyn Resolver| {
            let fs: SharedFs = Arc::new(UnionFs::from_config(config, resolver)?);
            Ok(fs)
        },
        unionfs::schema(),
    );
}

/// Apply `layer` to the underlying filesystem of a wrapper node.
fn wrap<L>(underlying: Option<SharedFs>, layer: L) -> Result<SharedFs, NodeError>
where
    L: Layer<SharedFs>,
    L::Backend: Fs + 'static,
{
    let inner = underlying.ok_or(NodeError::MissingUnderlying)?;
    let fs: SharedFs = Arc::new(inner.layer(layer));
    Ok(fs)
}

/// Check that `fs` could create a file at `path`.
///
/// Wrappers buffer streamed writes and only commit on flush or drop, so they
/// call this in `open_write` to fail up front like the underlying filesystem
/// would.
///
/// # Errors
///
/// - [`FsError::NotAFile`] if `path` is a directory
/// - [`FsError::NotFound`] if the parent directory does not exist
/// - [`FsError::NotADirectory`] if the parent is a file
pub(crate) fn check_creatable(fs: &SharedFs, path: &Path) -> Result<(), FsError> {
    match fs.metadata(path) {
        Ok(meta) if meta.is_dir() => {
            return Err(FsError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => return Ok(()),
        Err(FsError::NotFound { .. }) => {}
        Err(e) => return Err(e),
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            if fs.metadata(parent)?.is_dir() {
                Ok(())
            } else {
                Err(FsError::NotADirectory {
                    path: parent.to_path_buf(),
                })
            }
        }
        _ => Ok(()),
    }
}

fn present<'c>(config: &'c Config, field: &str) -> Option<&'c ConfigValue> {
    config
        .get(field)
        .filter(|v| !matches!(v, ConfigValue::Null))
}

pub(crate) fn opt_str<'c>(config: &'c Config, field: &str) -> Result<Option<&'c str>, NodeError> {
    present(config, field)
        .map(|v| {
            v.as_str()
                .ok_or_else(|| NodeError::config(field, "must be a string"))
        })
        .transpose()
}

pub(crate) fn opt_bool(config: &Config, field: &str) -> Result<Option<bool>, NodeError> {
    present(config, field)
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| NodeError::config(field, "must be a bool"))
        })
        .transpose()
}

pub(crate) fn opt_quantity(config: &Config, field: &str) -> Result<Option<u64>, NodeError> {
    present(config, field)
        .map(|v| {
            v.to_quantity()
                .map_err(|m| NodeError::config(field, m.to_string()))
        })
        .transpose()
}

pub(crate) fn opt_list<'c>(
    config: &'c Config,
    field: &str,
) -> Result<Option<&'c [ConfigValue]>, NodeError> {
    present(config, field)
        .map(|v| {
            v.as_list()
                .ok_or_else(|| NodeError::config(field, "must be a list"))
        })
        .transpose()
}
