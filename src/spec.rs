//! The composition specification: nodes, connections and a mount descriptor.
//!
//! A specification is plain data. Nothing in this module checks it; that is
//! the [`Validator`](crate::Validator)'s job.

use crate::value::{Config, ConfigValue};

/// One vertex in the composition graph.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Unique identifier within the specification.
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: String,
    /// Registered node type name (e.g. `memfs`, `cachefs`).
    #[cfg_attr(feature = "serde", serde(rename = "type", default))]
    pub node_type: String,
    /// Type-specific configuration.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Config::is_empty")
    )]
    pub config: Config,
}

impl Node {
    /// Create a node with an empty configuration.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Config::new(),
        }
    }

    /// Set a configuration field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(field.into(), value.into());
        self
    }
}

/// A directed edge: the filesystem built for `from` is the underlying
/// filesystem of `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Connection {
    /// The upstream (wrapped) node.
    #[cfg_attr(feature = "serde", serde(default))]
    pub from: String,
    /// The downstream (wrapping) node.
    #[cfg_attr(feature = "serde", serde(default))]
    pub to: String,
}

impl Connection {
    /// Create a connection `from → to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// How the composed filesystem is exposed, and which node it is.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MountDescriptor {
    /// Exposure mechanism: `fuse`, `webdav`, `nfs`, `api`, ...
    #[cfg_attr(feature = "serde", serde(rename = "type", default))]
    pub mount_type: String,
    /// Mount point path, when the mechanism uses one.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub path: Option<String>,
    /// Listening port, when the mechanism uses one.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub port: Option<u16>,
    /// ID of the node whose filesystem is mounted.
    #[cfg_attr(feature = "serde", serde(default))]
    pub root: String,
    /// Export name (network exports).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub export: Option<String>,
    /// Mechanism-specific options.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Config::is_empty")
    )]
    pub options: Config,
}

impl MountDescriptor {
    /// Create a mount of `root` through `mount_type`.
    pub fn new(mount_type: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            mount_type: mount_type.into(),
            root: root.into(),
            ..Self::default()
        }
    }
}

/// A complete composition: nodes, the connections between them and the
/// mount root.
///
/// # Example
///
/// ```rust
/// use fscomposer::{CompositionSpec, MountDescriptor, Node};
///
/// let spec = CompositionSpec::new("1.0", "cached-memory")
///     .node(Node::new("backend", "memfs"))
///     .node(Node::new("cache", "cachefs").with("policy", "LRU"))
///     .connect("backend", "cache")
///     .mount(MountDescriptor::new("api", "cache"));
///
/// assert_eq!(spec.incoming("cache").count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompositionSpec {
    /// Specification format version.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: String,
    /// Composition name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Free-form description.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "String::is_empty"))]
    pub description: String,
    /// Nodes in declaration order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub nodes: Vec<Node>,
    /// Connections in declaration order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub connections: Vec<Connection>,
    /// Mount descriptor.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mount: MountDescriptor,
}

impl CompositionSpec {
    /// Create an empty specification.
    pub fn new(version: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a node.
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append a connection `from → to`.
    pub fn connect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.connections.push(Connection::new(from, to));
        self
    }

    /// Set the mount descriptor.
    pub fn mount(mut self, mount: MountDescriptor) -> Self {
        self.mount = mount;
        self
    }

    /// Look up a node by ID.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Connections whose target is `id`.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.to == id)
    }

    /// Connections whose source is `id`.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.from == id)
    }

    /// Parse a JSON specification document.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a JSON specification document from bytes.
    #[cfg(feature = "serde")]
    pub fn from_json_slice(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to pretty-printed JSON.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
