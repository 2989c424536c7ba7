//! # Extension Traits
//!
//! Convenience methods available on every filesystem in a stack.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`is_file`](FsExt::is_file) | Check if path is a regular file |
//! | [`is_dir`](FsExt::is_dir) | Check if path is a directory |
//! | [`read_to_string`](FsExt::read_to_string) | Read a UTF-8 file |

use crate::{Fs, FsError};
use std::path::Path;

/// Extension methods for any filesystem.
///
/// # Example
///
/// ```rust
/// use fscomposer::{Fs, FsExt, FsError};
/// use std::path::Path;
///
/// fn ensure_dir<B: Fs + ?Sized>(fs: &B, path: &Path) -> Result<(), FsError> {
///     if !fs.is_dir(path)? {
///         fs.create_dir_all(path)?;
///     }
///     Ok(())
/// }
/// ```
pub trait FsExt: Fs {
    /// Check if the path points to a regular file.
    ///
    /// Returns `Ok(false)` if the path doesn't exist.
    fn is_file(&self, path: &Path) -> Result<bool, FsError> {
        match self.metadata(path) {
            Ok(m) => Ok(m.is_file()),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path points to a directory.
    ///
    /// Returns `Ok(false)` if the path doesn't exist.
    fn is_dir(&self, path: &Path) -> Result<bool, FsError> {
        match self.metadata(path) {
            Ok(m) => Ok(m.is_dir()),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read file contents as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidData`] if the file is not valid UTF-8
    fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        String::from_utf8(self.read(path)?).map_err(|_| FsError::InvalidData {
            path: path.to_path_buf(),
            details: "file contents are not valid UTF-8".into(),
        })
    }
}

impl<B: Fs + ?Sized> FsExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::MemFs;
    use crate::{FsDir, FsWrite};

    #[test]
    fn is_file_and_is_dir() {
        let fs = MemFs::new();
        fs.create_dir(Path::new("/d")).unwrap();
        fs.write(Path::new("/d/f"), b"x").unwrap();

        assert!(fs.is_dir(Path::new("/d")).unwrap());
        assert!(!fs.is_file(Path::new("/d")).unwrap());
        assert!(fs.is_file(Path::new("/d/f")).unwrap());
        assert!(!fs.is_file(Path::new("/missing")).unwrap());
    }

    #[test]
    fn read_to_string_rejects_invalid_utf8() {
        let fs = MemFs::new();
        fs.write(Path::new("/bin"), &[0xff, 0xfe]).unwrap();
        assert!(matches!(
            fs.read_to_string(Path::new("/bin")),
            Err(FsError::InvalidData { .. })
        ));
    }
}
