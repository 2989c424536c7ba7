//! # fscomposer
//!
//! Declarative composition of pluggable filesystems.
//!
//! A [`CompositionSpec`] names a set of nodes (backends, wrappers and
//! multiplexers), the connections between them and the node exposed at the
//! mount root. This crate checks such a specification against a [`Registry`]
//! of node types and turns it into a single live filesystem stack.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use fscomposer::{Builder, CompositionSpec, MountDescriptor, Node, Registry};
//! use fscomposer::{FsRead, FsWrite};
//! use std::path::Path;
//!
//! let registry = Registry::with_builtins();
//! let spec = CompositionSpec::new("1.0", "cached-memory")
//!     .node(Node::new("mem", "memfs"))
//!     .node(Node::new("cache", "cachefs").with("maxBytes", 1048576).with("policy", "LRU"))
//!     .connect("mem", "cache")
//!     .mount(MountDescriptor::new("fuse", "cache"));
//!
//! let fs = Builder::new(&spec, &registry).build()?;
//! fs.write(Path::new("/hello.txt"), b"hello")?;
//! assert_eq!(fs.read(Path::new("/hello.txt"))?, b"hello");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`CompositionSpec`] | Nodes, connections and mount descriptor |
//! | [`Registry`] | Node type name to constructor and schema |
//! | [`Validator`] | Structural, cycle, arity and configuration checks |
//! | [`Builder`] | Constructs the node graph bottom-up, once per node |
//! | [`Fs`] | The filesystem every node produces |
//! | [`ComposeError`] | Validation and build failures with node context |
//! | [`FsError`] | Filesystem operation failures |
//!
//! ---
//!
//! ## Node Categories
//!
//! ```text
//! backend      memfs, osfs                    no incoming connections
//! wrapper      cachefs, encryptfs, retryfs,   exactly one incoming connection
//!              metricsfs, logfs
//! multiplexer  switchfs, unionfs              no incoming connections,
//!                                             children named in config
//! ```
//!
//! Built-in types live in [`nodes`]. Custom types are added with
//! [`Registry::register`]; a custom type must also be one of the classified
//! names in [`kind`] to pass validation.
//!
//! ---
//!
//! ## Thread Safety
//!
//! All filesystem traits require `Send + Sync` and take `&self`. A built
//! stack is a [`SharedFs`] (`Arc<dyn Fs>`) and can be cloned across threads.
//! The [`Registry`] is safe for concurrent registration and lookup.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` (default) | JSON specification documents, serializable metadata and snapshots |

mod builder;
mod error;
mod ext;
pub mod kind;
mod layer;
pub mod nodes;
mod registry;
mod spec;
mod traits;
mod types;
mod validator;
mod value;

// Public re-exports - composition
pub use builder::Builder;
pub use registry::{
    Constructor, FieldKind, NodeSchema, NodeTypeInfo, Registry, Resolver, SchemaField,
};
pub use spec::{CompositionSpec, Connection, MountDescriptor, Node};
pub use validator::Validator;
pub use value::{Config, ConfigValue, Mismatch};

// Public re-exports - errors
pub use error::{ComposeError, ErrorKind, FsError, NodeError, Result};

// Public re-exports - filesystem traits and types
pub use kind::NodeCategory;
pub use traits::{
    CommitWriter, FileReader, Fs, FsDir, FsRead, FsWrite, ReadDirIter, SharedFs,
};
pub use types::{DirEntry, FileType, Metadata, Permissions};

// Public re-exports - infrastructure
pub use ext::FsExt;
pub use layer::{Layer, LayerExt};
