//! Path router (`switchfs`).
//!
//! Sends each operation to the filesystem of the first route whose pattern
//! matches the path, or to the default target when none does.
//!
//! Pattern forms:
//!
//! - `*.log`: suffix match on the whole path
//! - `/tmp/*`: prefix match
//! - `/data`: the path itself and everything below it (`/` matches all)

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::error::NodeError;
use crate::nodes::memfs::normalize;
use crate::nodes::{opt_list, opt_str};
use crate::registry::{FieldKind, NodeSchema, Resolver, SchemaField};
use crate::value::{Config, ConfigValue};
use crate::{FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter, SharedFs};

/// One routing rule.
#[derive(Clone)]
pub struct Route {
    pattern: String,
    target: String,
    fs: SharedFs,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Route {
    /// Route paths matching `pattern` to `fs`, built from node `target`.
    pub fn new(pattern: impl Into<String>, target: impl Into<String>, fs: SharedFs) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
            fs,
        }
    }

    /// The pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The target node ID.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns `true` if `path` (absolute, normalized) matches.
    pub fn matches(&self, path: &str) -> bool {
        let pattern = self.pattern.as_str();
        if let Some(suffix) = pattern.strip_prefix('*') {
            return path.ends_with(suffix);
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return path.starts_with(prefix);
        }
        let prefix = pattern.trim_end_matches('/');
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("switchfs", "Routes paths to different filesystems by pattern")
        .field(
            SchemaField::new("routes", FieldKind::List)
                .required()
                .describe("Ordered list of {pattern, target} maps, first match wins"),
        )
        .field(
            SchemaField::new("default", FieldKind::String)
                .describe("Node used when no route matches"),
        )
}

/// Filesystem multiplexer routing by path.
#[derive(Clone)]
pub struct SwitchFs {
    routes: Vec<Route>,
    default: Option<SharedFs>,
}

impl fmt::Debug for SwitchFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchFs")
            .field("routes", &self.routes)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

impl SwitchFs {
    /// A router over `routes`, falling back to `default`.
    pub fn new(routes: Vec<Route>, default: Option<SharedFs>) -> Self {
        Self { routes, default }
    }

    /// Build from `routes` and `default`, resolving every target node.
    pub fn from_config(config: &Config, resolver: &mut dyn Resolver) -> Result<Self, NodeError> {
        let items = opt_list(config, "routes")?.unwrap_or_default();
        if items.is_empty() {
            return Err(NodeError::config("routes", "at least one route is required"));
        }

        let mut routes = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let field = |name: &str| {
                item.as_map()
                    .and_then(|m| m.get(name))
                    .and_then(ConfigValue::as_str)
                    .ok_or_else(|| NodeError::config("routes", format!("route {i} missing '{name}'")))
            };
            let (pattern, target) = (field("pattern")?, field("target")?);
            routes.push(Route::new(pattern, target, resolver.resolve(target)?));
        }

        let default = opt_str(config, "default")?
            .map(|id| resolver.resolve(id))
            .transpose()?;
        Ok(Self::new(routes, default))
    }

    /// The routes in match order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    fn route(&self, path: &Path) -> Result<&SharedFs, FsError> {
        let normalized = normalize(path);
        let key = normalized.to_string_lossy();
        self.routes
            .iter()
            .find(|r| r.matches(&key))
            .map(|r| &r.fs)
            .or(self.default.as_ref())
            .ok_or_else(|| FsError::NotFound {
                path: path.to_path_buf(),
            })
    }
}

impl FsRead for SwitchFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.route(path)?.read(path)
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        self.route(path)?.metadata(path)
    }
}

impl FsWrite for SwitchFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.route(path)?.write(path, data)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.route(path)?.remove_file(path)
    }

    /// Renames across targets copy the file and remove the source.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let (src, dst) = (self.route(from)?, self.route(to)?);
        if Arc::ptr_eq(src, dst) {
            return src.rename(from, to);
        }
        if src.metadata(from)?.is_dir() {
            return Err(FsError::NotSupported {
                operation: "rename a directory across routes",
            });
        }
        dst.write(to, &src.read(from)?)?;
        src.remove_file(from)
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        self.route(path)?.open_write(path)
    }
}

impl FsDir for SwitchFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        self.route(path)?.read_dir(path)
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.route(path)?.create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.route(path)?.create_dir_all(path)
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.route(path)?.remove_dir(path)
    }
}
