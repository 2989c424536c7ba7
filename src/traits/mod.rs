//! # Filesystem Traits
//!
//! The capability every node in a composed stack produces and consumes.
//!
//! ```text
//! FsRead + FsWrite + FsDir = Fs
//! ```
//!
//! [`Fs`] has a blanket implementation: implement the three component traits
//! and the composite comes for free. A built node is handed around as a
//! [`SharedFs`], so a wrapper can hold its underlying filesystem while other
//! nodes in the graph hold it too.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`. Methods take `&self`; implementations use
//! interior mutability for their own state.
//!
//! ## Object Safety
//!
//! All traits are object-safe:
//!
//! ```rust
//! use fscomposer::Fs;
//!
//! fn process(fs: &dyn Fs) {
//!     let _ = fs.read(std::path::Path::new("/file.txt"));
//! }
//! ```

use std::sync::Arc;

mod fs_dir;
mod fs_read;
mod fs_write;

pub use fs_dir::{FsDir, ReadDirIter};
pub use fs_read::{FileReader, FsRead};
pub use fs_write::{CommitWriter, FsWrite};

/// Basic filesystem: reading, writing and directory operations.
///
/// # Example
///
/// ```rust
/// use fscomposer::{Fs, FsError};
/// use std::path::Path;
///
/// fn backup_file<B: Fs + ?Sized>(fs: &B, src: &Path, dst: &Path) -> Result<(), FsError> {
///     let data = fs.read(src)?;
///     if let Some(parent) = dst.parent() {
///         fs.create_dir_all(parent)?;
///     }
///     fs.write(dst, &data)
/// }
/// ```
pub trait Fs: FsRead + FsWrite + FsDir {}

impl<T: FsRead + FsWrite + FsDir + ?Sized> Fs for T {}

/// A constructed filesystem handle, shared between the nodes that use it.
pub type SharedFs = Arc<dyn Fs>;
