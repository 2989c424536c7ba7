//! In-memory backend (`memfs`).
//!
//! All data is lost when the last handle is dropped.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::registry::NodeSchema;
use crate::{
    CommitWriter, DirEntry, FileType, FsDir, FsError, FsRead, FsWrite, Metadata, ReadDirIter,
};

#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl Entry {
    fn metadata(&self) -> Metadata {
        match self {
            Entry::File { data, modified } => Metadata::file(data.len() as u64, *modified),
            Entry::Directory { modified } => Metadata::directory(*modified),
        }
    }

    fn file_type(&self) -> FileType {
        match self {
            Entry::File { .. } => FileType::File,
            Entry::Directory { .. } => FileType::Directory,
        }
    }
}

type Tree = BTreeMap<PathBuf, Entry>;

/// In-memory filesystem.
///
/// Clones share the same tree. Paths are normalized: `.` is ignored and `..`
/// never climbs above `/`.
#[derive(Debug, Clone)]
pub struct MemFs {
    tree: Arc<RwLock<Tree>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create an empty filesystem containing only `/`.
    pub fn new() -> Self {
        let mut tree = Tree::new();
        tree.insert(
            PathBuf::from("/"),
            Entry::Directory {
                modified: SystemTime::now(),
            },
        );
        Self {
            tree: Arc::new(RwLock::new(tree)),
        }
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("memfs", "In-memory filesystem, contents are lost on unmount")
}

/// Absolute, `.`/`..`-free form of `path`.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

fn require_parent_dir(tree: &Tree, path: &Path) -> Result<(), FsError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match tree.get(parent) {
        Some(Entry::Directory { .. }) => Ok(()),
        Some(Entry::File { .. }) => Err(FsError::NotADirectory {
            path: parent.to_path_buf(),
        }),
        None => Err(FsError::NotFound {
            path: parent.to_path_buf(),
        }),
    }
}

fn store(tree: &mut Tree, path: &Path, data: &[u8]) -> Result<(), FsError> {
    if path == Path::new("/") {
        return Err(FsError::NotAFile { path: path.into() });
    }
    require_parent_dir(tree, path)?;
    if let Some(Entry::Directory { .. }) = tree.get(path) {
        return Err(FsError::NotAFile { path: path.into() });
    }
    tree.insert(
        path.to_path_buf(),
        Entry::File {
            data: data.to_vec(),
            modified: SystemTime::now(),
        },
    );
    Ok(())
}

impl FsRead for MemFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let path = normalize(path);
        match self.tree.read().get(&path) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(FsError::NotAFile { path }),
            None => Err(FsError::NotFound { path }),
        }
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        let path = normalize(path);
        self.tree
            .read()
            .get(&path)
            .map(Entry::metadata)
            .ok_or(FsError::NotFound { path })
    }
}

impl FsWrite for MemFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        store(&mut self.tree.write(), &normalize(path), data)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        let path = normalize(path);
        let mut tree = self.tree.write();
        match tree.get(&path) {
            Some(Entry::File { .. }) => {
                tree.remove(&path);
                Ok(())
            }
            Some(Entry::Directory { .. }) => Err(FsError::NotAFile { path }),
            None => Err(FsError::NotFound { path }),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let (from, to) = (normalize(from), normalize(to));
        let mut tree = self.tree.write();

        if !tree.contains_key(&from) {
            return Err(FsError::NotFound { path: from });
        }
        if from == Path::new("/") || (to.starts_with(&from) && to != from) {
            return Err(FsError::PermissionDenied {
                path: from,
                operation: "rename",
            });
        }
        require_parent_dir(&tree, &to)?;
        if let Some(Entry::Directory { .. }) = tree.get(&to) {
            return Err(FsError::AlreadyExists {
                path: to,
                operation: "rename",
            });
        }

        let moved: Vec<PathBuf> = tree
            .range(from.clone()..)
            .take_while(|(p, _)| p.starts_with(&from))
            .map(|(p, _)| p.clone())
            .collect();
        for old in moved {
            if let Some(e) = tree.remove(&old) {
                let suffix = old.strip_prefix(&from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.clone()
                } else {
                    to.join(suffix)
                };
                tree.insert(new, e);
            }
        }
        Ok(())
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        let path = normalize(path);
        {
            let tree = self.tree.read();
            require_parent_dir(&tree, &path)?;
            if let Some(Entry::Directory { .. }) = tree.get(&path) {
                return Err(FsError::NotAFile { path });
            }
        }
        let tree = Arc::clone(&self.tree);
        Ok(Box::new(CommitWriter::new(path, move |p: &Path, data: &[u8]| {
            store(&mut tree.write(), p, data)
        })))
    }
}

impl FsDir for MemFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        let path = normalize(path);
        let tree = self.tree.read();
        match tree.get(&path) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => return Err(FsError::NotADirectory { path }),
            None => return Err(FsError::NotFound { path }),
        }

        let entries: Vec<_> = tree
            .iter()
            .filter(|(p, _)| p.parent() == Some(path.as_path()))
            .map(|(p, e)| {
                Ok(DirEntry {
                    name: p
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    path: p.clone(),
                    file_type: e.file_type(),
                    size: e.metadata().size,
                })
            })
            .collect();
        Ok(ReadDirIter::from_vec(entries))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        let path = normalize(path);
        let mut tree = self.tree.write();
        if tree.contains_key(&path) {
            return Err(FsError::AlreadyExists {
                path,
                operation: "create_dir",
            });
        }
        require_parent_dir(&tree, &path)?;
        tree.insert(
            path,
            Entry::Directory {
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        let path = normalize(path);
        let mut tree = self.tree.write();
        for dir in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            match tree.get(dir) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => {
                    return Err(FsError::NotADirectory { path: dir.into() });
                }
                None => {
                    tree.insert(
                        dir.to_path_buf(),
                        Entry::Directory {
                            modified: SystemTime::now(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        let path = normalize(path);
        let mut tree = self.tree.write();
        match tree.get(&path) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => return Err(FsError::NotADirectory { path }),
            None => return Err(FsError::NotFound { path }),
        }
        if path == Path::new("/") {
            return Err(FsError::PermissionDenied {
                path,
                operation: "remove_dir",
            });
        }
        if tree.keys().any(|p| p.parent() == Some(path.as_path())) {
            return Err(FsError::DirectoryNotEmpty { path });
        }
        tree.remove(&path);
        Ok(())
    }
}
