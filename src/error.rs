//! Error types for filesystem operations and stack composition.

use std::path::PathBuf;

/// Filesystem error type with contextual variants.
///
/// Returned by every [`Fs`](crate::Fs) operation. Variants carry the path
/// and operation involved where applicable.
///
/// # Examples
///
/// ```rust
/// use fscomposer::FsError;
/// use std::path::PathBuf;
///
/// let err = FsError::NotFound { path: PathBuf::from("/missing") };
/// assert!(err.to_string().contains("/missing"));
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Path already exists when it shouldn't.
    #[error("{operation}: already exists: {path}")]
    AlreadyExists {
        /// The path that already exists.
        path: PathBuf,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Expected a file but found something else.
    #[error("not a file: {path}")]
    NotAFile {
        /// The path that is not a file.
        path: PathBuf,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The path that is not a directory.
        path: PathBuf,
    },

    /// Directory is not empty when it should be.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The path to the non-empty directory.
        path: PathBuf,
    },

    /// Permission denied for operation.
    #[error("{operation}: permission denied: {path}")]
    PermissionDenied {
        /// The path where permission was denied.
        path: PathBuf,
        /// The operation that was denied.
        operation: &'static str,
    },

    /// Access denied with reason (e.g. a path escaping a backend root).
    #[error("access denied: {path} ({reason})")]
    AccessDenied {
        /// The path where access was denied.
        path: PathBuf,
        /// The reason for denial.
        reason: String,
    },

    /// Invalid data encountered.
    #[error("invalid data: {path} ({details})")]
    InvalidData {
        /// The path with invalid data.
        path: PathBuf,
        /// Details about the invalid data.
        details: String,
    },

    /// Data integrity check failed (e.g. authenticated decryption).
    #[error("integrity error: {path}")]
    IntegrityError {
        /// The path that failed integrity check.
        path: PathBuf,
    },

    /// Operation is not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// Generic backend error.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error with context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Returns `true` for failures worth retrying (I/O and backend errors).
    ///
    /// Missing paths, permission problems and data errors are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, FsError::Io { .. } | FsError::Backend(_))
    }
}

impl From<std::io::Error> for FsError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound {
                path: PathBuf::new(),
            },
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied {
                path: PathBuf::new(),
                operation: "io",
            },
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists {
                path: PathBuf::new(),
                operation: "io",
            },
            _ => FsError::Io {
                operation: "io",
                path: PathBuf::new(),
                source: error,
            },
        }
    }
}

impl From<FsError> for std::io::Error {
    fn from(error: FsError) -> Self {
        let kind = match &error {
            FsError::NotFound { .. } => std::io::ErrorKind::NotFound,
            FsError::AlreadyExists { .. } => std::io::ErrorKind::AlreadyExists,
            FsError::PermissionDenied { .. } | FsError::AccessDenied { .. } => {
                std::io::ErrorKind::PermissionDenied
            }
            FsError::InvalidData { .. } | FsError::IntegrityError { .. } => {
                std::io::ErrorKind::InvalidData
            }
            FsError::NotSupported { .. } => std::io::ErrorKind::Unsupported,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, error)
    }
}

/// The kind of a composition failure, independent of its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing top-level fields, no nodes, duplicate or empty IDs.
    MalformedSpecification,
    /// A node type missing from the classification or the registry.
    UnknownNodeType,
    /// A connection or mount root naming a node that does not exist.
    DanglingReference,
    /// The composition graph contains a cycle.
    CycleDetected,
    /// A node has the wrong number of incoming connections for its type.
    ArityViolation,
    /// A node's configuration is missing fields or has illegal values.
    InvalidConfiguration,
    /// A constructor failed while building a node.
    ConstructionFailure,
    /// The builder could not find a node it was asked to build.
    NodeNotFound,
    /// The mount descriptor has no root.
    EmptyMountRoot,
    /// The builder reached a state validation should have excluded.
    Internal,
    /// A textual specification could not be parsed.
    Parse,
}

/// Errors produced while validating or building a composition.
///
/// Every failure is terminal for the operation that produced it. The error
/// carries the node ID, node type and configuration field needed to locate
/// the fault.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// The specification is structurally incomplete.
    #[error("malformed specification: {0}")]
    MalformedSpecification(String),

    /// A node references a type that is not classified or not registered.
    #[error("{}unknown node type: {node_type}", node.as_deref().map(|n| format!("node {n}: ")).unwrap_or_default())]
    UnknownNodeType {
        /// The node carrying the type, when known.
        node: Option<String>,
        /// The unknown type name.
        node_type: String,
    },

    /// A reference to a node ID that does not exist.
    #[error("{location}: node {node} not found")]
    DanglingReference {
        /// Where the reference appears (e.g. "connection 2 'from'").
        location: String,
        /// The missing node ID.
        node: String,
    },

    /// The connection graph contains a cycle.
    #[error("cycle detected in composition graph involving node {node}")]
    CycleDetected {
        /// A node on the cycle.
        node: String,
    },

    /// A node has incoming connections its type does not allow.
    #[error("node {node} ({node_type}): {reason}")]
    ArityViolation {
        /// The offending node.
        node: String,
        /// Its type.
        node_type: String,
        /// What rule was broken.
        reason: String,
    },

    /// A configuration field is missing, mistyped or out of range.
    #[error("node {node}: invalid '{field}': {reason}")]
    InvalidConfiguration {
        /// The offending node.
        node: String,
        /// The configuration field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A constructor returned an error.
    #[error("failed to construct node {node} ({node_type}): {source}")]
    ConstructionFailure {
        /// The node being constructed.
        node: String,
        /// Its type.
        node_type: String,
        /// The constructor's error.
        #[source]
        source: NodeError,
    },

    /// The builder was asked for a node the specification does not contain.
    #[error("node {0} not found in specification")]
    NodeNotFound(String),

    /// The mount descriptor has an empty root.
    #[error("mount root is empty")]
    EmptyMountRoot,

    /// Internal-consistency failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// The specification document could not be parsed.
    #[cfg(feature = "serde")]
    #[error("failed to parse specification: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ComposeError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ComposeError::MalformedSpecification(_) => ErrorKind::MalformedSpecification,
            ComposeError::UnknownNodeType { .. } => ErrorKind::UnknownNodeType,
            ComposeError::DanglingReference { .. } => ErrorKind::DanglingReference,
            ComposeError::CycleDetected { .. } => ErrorKind::CycleDetected,
            ComposeError::ArityViolation { .. } => ErrorKind::ArityViolation,
            ComposeError::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            ComposeError::ConstructionFailure { .. } => ErrorKind::ConstructionFailure,
            ComposeError::NodeNotFound(_) => ErrorKind::NodeNotFound,
            ComposeError::EmptyMountRoot => ErrorKind::EmptyMountRoot,
            ComposeError::Internal(_) => ErrorKind::Internal,
            #[cfg(feature = "serde")]
            ComposeError::Parse(_) => ErrorKind::Parse,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ComposeError::MalformedSpecification(msg.into())
    }

    pub(crate) fn config(
        node: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ComposeError::InvalidConfiguration {
            node: node.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn arity(
        node: impl Into<String>,
        node_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ComposeError::ArityViolation {
            node: node.into(),
            node_type: node_type.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned by a node constructor.
///
/// The builder wraps it in [`ComposeError::ConstructionFailure`] together
/// with the node ID and type.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// A wrapper was constructed without an underlying filesystem.
    #[error("requires an underlying filesystem")]
    MissingUnderlying,

    /// A configuration field could not be interpreted.
    #[error("config '{field}': {reason}")]
    Config {
        /// The configuration field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A configured option is recognized but not available.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The filesystem could not be opened or prepared.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// A node referenced through configuration failed to build.
    #[error("referenced node failed: {0}")]
    Resolve(#[from] Box<ComposeError>),
}

impl NodeError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        NodeError::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ComposeError> for NodeError {
    fn from(error: ComposeError) -> Self {
        NodeError::Resolve(Box::new(error))
    }
}

/// Result alias for composition operations.
pub type Result<T, E = ComposeError> = std::result::Result<T, E>;
