//! Classification of node types into backends, wrappers and multiplexers.
//!
//! The classification is a fixed table, independent of what is registered:
//! structural validation depends on it and must give the same answer whether
//! or not a type's implementation has been registered yet.

use std::fmt;

/// Backend types: raw storage, never consume another filesystem.
pub const BACKEND_TYPES: &[&str] = &[
    "osfs", "memfs", "s3fs", "sftpfs", "webdavfs", "boltfs", "httpfs",
];

/// Wrapper types: transform or augment an underlying filesystem.
pub const WRAPPER_TYPES: &[&str] = &[
    "cachefs",
    "encryptfs",
    "compressfs",
    "retryfs",
    "metricsfs",
    "unionfs",
    "permfs",
    "quotafs",
    "switchfs",
    "logfs",
];

/// Wrapper types that combine several filesystems named in their own
/// configuration instead of a single incoming connection.
pub const MULTIPLEXER_TYPES: &[&str] = &["switchfs", "unionfs"];

/// Category of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NodeCategory {
    /// Raw storage with no underlying filesystem.
    Backend,
    /// Wraps exactly one underlying filesystem.
    Wrapper,
    /// Combines filesystems referenced in its configuration.
    Multiplexer,
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeCategory::Backend => "backend",
            NodeCategory::Wrapper => "wrapper",
            NodeCategory::Multiplexer => "multiplexer",
        })
    }
}

/// Returns `true` if `node_type` is a backend.
pub fn is_backend(node_type: &str) -> bool {
    BACKEND_TYPES.contains(&node_type)
}

/// Returns `true` if `node_type` is a wrapper (multiplexers included).
pub fn is_wrapper(node_type: &str) -> bool {
    WRAPPER_TYPES.contains(&node_type)
}

/// Returns `true` if `node_type` is a multiplexer.
pub fn is_multiplexer(node_type: &str) -> bool {
    MULTIPLEXER_TYPES.contains(&node_type)
}

/// The category of `node_type`, or `None` for an unknown type.
pub fn category(node_type: &str) -> Option<NodeCategory> {
    if is_multiplexer(node_type) {
        Some(NodeCategory::Multiplexer)
    } else if is_wrapper(node_type) {
        Some(NodeCategory::Wrapper)
    } else if is_backend(node_type) {
        Some(NodeCategory::Backend)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplexers_are_wrappers() {
        for t in MULTIPLEXER_TYPES {
            assert!(is_wrapper(t), "{t}");
            assert_eq!(category(t), Some(NodeCategory::Multiplexer));
        }
    }

    #[test]
    fn categories_are_disjoint() {
        for t in BACKEND_TYPES {
            assert!(!is_wrapper(t), "{t}");
            assert_eq!(category(t), Some(NodeCategory::Backend));
        }
        assert_eq!(category("cachefs"), Some(NodeCategory::Wrapper));
    }

    #[test]
    fn unknown_type_has_no_category() {
        assert_eq!(category("does-not-exist"), None);
        assert!(!is_backend(""));
    }
}
