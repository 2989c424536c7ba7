//! Layered view (`unionfs`).

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::NodeError;
use crate::nodes::opt_list;
use crate::registry::{FieldKind, NodeSchema, Resolver, SchemaField};
use crate::value::Config;
use crate::{FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter, SharedFs};

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("unionfs", "Stacks filesystems, upper layers shadow lower ones").field(
        SchemaField::new("layers", FieldKind::List)
            .required()
            .describe("Node IDs from top to bottom, writes go to the top"),
    )
}

/// Filesystem multiplexer stacking layers.
///
/// - reads go to the first layer that has the path
/// - writes and directory creation go to the top layer, creating parent
///   directories there when a lower layer already has them
/// - listings merge every layer, upper entries shadowing lower ones
/// - removals apply to every layer holding the path
#[derive(Clone)]
pub struct UnionFs {
    layers: Vec<SharedFs>,
}

impl fmt::Debug for UnionFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionFs")
            .field("layers", &self.layers.len())
            .finish()
    }
}

fn not_found(path: &Path) -> FsError {
    FsError::NotFound {
        path: path.to_path_buf(),
    }
}

impl UnionFs {
    /// Stack `layers`, top first.
    ///
    /// # Errors
    ///
    /// [`NodeError::Config`] if `layers` is empty.
    pub fn new(layers: Vec<SharedFs>) -> Result<Self, NodeError> {
        if layers.is_empty() {
            return Err(NodeError::config("layers", "at least one layer is required"));
        }
        Ok(Self { layers })
    }

    /// Build from `layers`, resolving every node ID.
    pub fn from_config(config: &Config, resolver: &mut dyn Resolver) -> Result<Self, NodeError> {
        let mut layers = Vec::new();
        for (i, item) in opt_list(config, "layers")?.unwrap_or_default().iter().enumerate() {
            let id = item
                .as_str()
                .ok_or_else(|| NodeError::config("layers", format!("layer {i} is not a node id")))?;
            layers.push(resolver.resolve(id)?);
        }
        Self::new(layers)
    }

    fn top(&self) -> &SharedFs {
        &self.layers[0]
    }

    /// First layer answering for `path` with anything but `NotFound`.
    fn first<T>(
        &self,
        path: &Path,
        op: impl Fn(&SharedFs) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        for layer in &self.layers {
            match op(layer) {
                Err(FsError::NotFound { .. }) => continue,
                other => return other,
            }
        }
        Err(not_found(path))
    }

    /// Make sure the top layer has the parent directory of `path`.
    fn prepare_parent(&self, path: &Path) -> Result<(), FsError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if self.top().exists(parent)? {
            return Ok(());
        }
        if self.first(parent, |l| l.metadata(parent))?.is_dir() {
            self.top().create_dir_all(parent)
        } else {
            Err(FsError::NotADirectory {
                path: parent.to_path_buf(),
            })
        }
    }

    /// Apply `op` to every layer holding `path`.
    fn remove_everywhere(
        &self,
        path: &Path,
        op: impl Fn(&SharedFs) -> Result<(), FsError>,
    ) -> Result<(), FsError> {
        let mut removed = false;
        for layer in &self.layers {
            match op(layer) {
                Ok(()) => removed = true,
                Err(FsError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if removed { Ok(()) } else { Err(not_found(path)) }
    }
}

impl FsRead for UnionFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.first(path, |l| l.read(path))
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        self.first(path, |l| l.metadata(path))
    }
}

impl FsWrite for UnionFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.prepare_parent(path)?;
        self.top().write(path, data)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.remove_everywhere(path, |l| l.remove_file(path))
    }

    /// A file only present in a lower layer is copied up to `to` and then
    /// removed from where it was.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        if self.top().exists(from)? {
            self.prepare_parent(to)?;
            return self.top().rename(from, to);
        }
        if self.metadata(from)?.is_dir() {
            return Err(FsError::NotSupported {
                operation: "rename a lower-layer directory",
            });
        }
        let data = self.read(from)?;
        self.write(to, &data)?;
        self.remove_file(from)
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        self.prepare_parent(path)?;
        self.top().open_write(path)
    }
}

impl FsDir for UnionFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        let mut merged = BTreeMap::new();
        let mut found = false;
        for layer in &self.layers {
            let entries = match layer.read_dir(path) {
                Ok(entries) => entries,
                Err(FsError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            found = true;
            for entry in entries {
                let entry = entry?;
                merged.entry(entry.name.clone()).or_insert(entry);
            }
        }
        if !found {
            return Err(not_found(path));
        }
        Ok(ReadDirIter::from_vec(merged.into_values().map(Ok).collect()))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        if self.exists(path)? {
            return Err(FsError::AlreadyExists {
                path: path.to_path_buf(),
                operation: "create_dir",
            });
        }
        self.prepare_parent(path)?;
        self.top().create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.top().create_dir_all(path)
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        if self.read_dir(path)?.next().is_some() {
            return Err(FsError::DirectoryNotEmpty {
                path: path.to_path_buf(),
            });
        }
        self.remove_everywhere(path, |l| l.remove_dir(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::MemFs;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn two_layers() -> (SharedFs, SharedFs, UnionFs) {
        let upper: SharedFs = Arc::new(MemFs::new());
        let lower: SharedFs = Arc::new(MemFs::new());
        let union = UnionFs::new(vec![upper.clone(), lower.clone()]).unwrap();
        (upper, lower, union)
    }

    #[test]
    fn reads_fall_through() {
        let (upper, lower, union) = two_layers();
        lower.write(Path::new("/base"), b"lower").unwrap();
        upper.write(Path::new("/both"), b"upper").unwrap();
        lower.write(Path::new("/both"), b"lower").unwrap();

        assert_eq!(union.read(Path::new("/base")).unwrap(), b"lower");
        assert_eq!(union.read(Path::new("/both")).unwrap(), b"upper");
        assert!(matches!(
            union.read(Path::new("/none")),
            Err(FsError::NotFound { .. })
        ));
    }

    #[test]
    fn writes_go_to_top_with_parents_copied_up() {
        let (upper, lower, union) = two_layers();
        lower.create_dir_all(Path::new("/etc/app")).unwrap();
        union.write(Path::new("/etc/app/conf"), b"new").unwrap();

        assert_eq!(upper.read(Path::new("/etc/app/conf")).unwrap(), b"new");
        assert!(!lower.exists(Path::new("/etc/app/conf")).unwrap());
    }

    #[test]
    fn listing_merges_layers() {
        let (upper, lower, union) = two_layers();
        lower.write(Path::new("/a"), b"1").unwrap();
        lower.write(Path::new("/b"), b"lower-b").unwrap();
        upper.write(Path::new("/b"), b"B").unwrap();
        upper.write(Path::new("/c"), b"3").unwrap();

        let entries = union.read_dir(Path::new("/")).unwrap().collect_all().unwrap();
        let listed: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.size)).collect();
        assert_eq!(listed, vec![("a", 1), ("b", 1), ("c", 1)]);
    }

    #[test]
    fn remove_clears_every_layer() {
        let (upper, lower, union) = two_layers();
        upper.write(Path::new("/f"), b"u").unwrap();
        lower.write(Path::new("/f"), b"l").unwrap();
        union.remove_file(Path::new("/f")).unwrap();
        assert!(!union.exists(Path::new("/f")).unwrap());
        assert!(union.remove_file(Path::new("/f")).is_err());
    }

    #[test]
    fn rename_copies_up_from_lower_layer() {
        let (upper, lower, union) = two_layers();
        lower.write(Path::new("/old"), b"data").unwrap();
        union.rename(Path::new("/old"), Path::new("/new")).unwrap();
        assert_eq!(upper.read(Path::new("/new")).unwrap(), b"data");
        assert!(!union.exists(Path::new("/old")).unwrap());
    }

    #[test]
    fn needs_a_layer() {
        assert!(UnionFs::new(Vec::new()).is_err());
    }
}
