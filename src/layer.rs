//! # Layer Trait
//!
//! Tower-style wrapping of an underlying filesystem.
//!
//! Every wrapper node type is split in two: a `*Layer` that holds the
//! configuration parsed from the node, and the wrapper filesystem it produces
//! once it is given the node's underlying filesystem.
//!
//! ```text
//! Config ──▶ XxxLayer::from_config() ──▶ layer(underlying) ──▶ XxxFs
//! ```

use crate::SharedFs;

/// Turns an underlying filesystem into a wrapper filesystem.
///
/// # Example
///
/// ```rust
/// use fscomposer::nodes::{MemFs, RetryLayer};
/// use fscomposer::{FsRead, FsWrite, Layer, SharedFs};
/// use std::path::Path;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let mem: SharedFs = Arc::new(MemFs::new());
/// let retrying = RetryLayer::new(5, Duration::from_millis(10)).layer(mem);
/// retrying.write(Path::new("/f"), b"data")?;
/// assert_eq!(retrying.read(Path::new("/f"))?, b"data");
/// # Ok::<(), fscomposer::FsError>(())
/// ```
pub trait Layer<B> {
    /// The wrapper produced.
    type Backend;

    /// Wrap `inner`.
    fn layer(self, inner: B) -> Self::Backend;
}

/// Extension trait for fluent layer composition on shared filesystems.
///
/// ```rust
/// use fscomposer::{Layer, LayerExt, SharedFs};
///
/// fn wrap<L: Layer<SharedFs>>(fs: SharedFs, layer: L) -> L::Backend {
///     fs.layer(layer)
/// }
/// ```
pub trait LayerExt: Sized {
    /// Apply `layer` to `self`.
    fn layer<L: Layer<Self>>(self, layer: L) -> L::Backend {
        layer.layer(self)
    }
}

impl LayerExt for SharedFs {}
