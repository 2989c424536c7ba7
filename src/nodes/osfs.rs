//! Local-disk backend (`osfs`).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::nodes::memfs::normalize;
use crate::registry::{FieldKind, NodeSchema, SchemaField};
use crate::{
    DirEntry, FileReader, FileType, FsDir, FsError, FsRead, FsWrite, Metadata, Permissions,
    ReadDirIter,
};

/// A local directory exposed as a filesystem rooted at `/`.
///
/// Paths are resolved inside the root. A path that would leave the root,
/// lexically or through a symlink, fails with [`FsError::AccessDenied`].
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    /// Open `root`, creating it if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, FsError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error("create_dir_all", &root, e))?;
        let root = root
            .canonicalize()
            .map_err(|e| io_error("canonicalize", &root, e))?;
        Ok(Self { root })
    }

    /// The canonical host directory backing `/`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, FsError> {
        let virtual_path = normalize(path);
        let relative = virtual_path.strip_prefix("/").unwrap_or(virtual_path.as_path());
        let full = self.root.join(relative);

        let canonical = if full.exists() {
            full.canonicalize()
                .map_err(|e| io_error("canonicalize", path, e))?
        } else {
            match (full.parent(), full.file_name()) {
                (Some(parent), Some(name)) if parent.exists() => parent
                    .canonicalize()
                    .map_err(|e| io_error("canonicalize", path, e))?
                    .join(name),
                _ => full,
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(FsError::AccessDenied {
                path: path.to_path_buf(),
                reason: "path escapes the filesystem root".into(),
            });
        }
        Ok(canonical)
    }
}

pub(crate) fn schema() -> NodeSchema {
    NodeSchema::new("osfs", "Local directory on the host filesystem").field(
        SchemaField::new("root", FieldKind::String)
            .required()
            .describe("Host directory to expose, created if missing"),
    )
}

/// Map a host I/O error, keeping the virtual path for the common kinds.
fn io_error(operation: &'static str, path: &Path, error: io::Error) -> FsError {
    let path = path.to_path_buf();
    match error.kind() {
        io::ErrorKind::NotFound => FsError::NotFound { path },
        io::ErrorKind::AlreadyExists => FsError::AlreadyExists { path, operation },
        io::ErrorKind::PermissionDenied => FsError::PermissionDenied { path, operation },
        _ => FsError::Io {
            operation,
            path,
            source: error,
        },
    }
}

fn to_metadata(meta: &fs::Metadata) -> Metadata {
    let modified = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let mut out = if meta.is_dir() {
        Metadata::directory(modified)
    } else {
        Metadata::file(meta.len(), modified)
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        out.permissions = Permissions::from_mode(meta.permissions().mode());
    }
    #[cfg(not(unix))]
    if meta.permissions().readonly() {
        out.permissions = Permissions::from_mode(out.permissions.mode() & !0o222);
    }
    out
}

impl FsRead for OsFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(FsError::NotAFile { path: path.into() });
        }
        fs::read(&full).map_err(|e| io_error("read", path, e))
    }

    fn metadata(&self, path: &Path) -> Result<Metadata, FsError> {
        let full = self.resolve(path)?;
        fs::metadata(&full)
            .map(|m| to_metadata(&m))
            .map_err(|e| io_error("metadata", path, e))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn FileReader>, FsError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(FsError::NotAFile { path: path.into() });
        }
        let file = fs::File::open(&full).map_err(|e| io_error("open_read", path, e))?;
        Ok(Box::new(file))
    }
}

impl FsWrite for OsFs {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        fs::write(&full, data).map_err(|e| io_error("write", path, e))
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(FsError::NotAFile { path: path.into() });
        }
        fs::remove_file(&full).map_err(|e| io_error("remove_file", path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let (src, dst) = (self.resolve(from)?, self.resolve(to)?);
        fs::rename(&src, &dst).map_err(|e| io_error("rename", from, e))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FsError> {
        let full = self.resolve(path)?;
        let file = fs::File::create(&full).map_err(|e| io_error("open_write", path, e))?;
        Ok(Box::new(file))
    }
}

impl FsDir for OsFs {
    fn read_dir(&self, path: &Path) -> Result<ReadDirIter, FsError> {
        let full = self.resolve(path)?;
        let base = normalize(path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| io_error("read_dir", path, e))? {
            let entry = entry.map_err(|e| io_error("read_dir", path, e))?;
            let meta = entry
                .metadata()
                .map_err(|e| io_error("read_dir", path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(DirEntry {
                path: base.join(&name),
                name,
                file_type: if meta.is_dir() {
                    FileType::Directory
                } else {
                    FileType::File
                },
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ReadDirIter::from_vec(entries.into_iter().map(Ok).collect()))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        fs::create_dir(&full).map_err(|e| io_error("create_dir", path, e))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|e| io_error("create_dir_all", path, e))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(FsError::PermissionDenied {
                path: path.into(),
                operation: "remove_dir",
            });
        }
        fs::remove_dir(&full).map_err(|e| match e.kind() {
            io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty { path: path.into() },
            _ => io_error("remove_dir", path, e),
        })
    }
}
