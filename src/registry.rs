//! # Capability Registry
//!
//! Maps a node type name to the constructor that builds it and the schema
//! that describes its configuration.
//!
//! A registry is filled once, before any specification is validated or
//! built, and is read concurrently afterwards. It is an ordinary value: pass
//! it (usually as `Arc<Registry>`) to the [`Validator`](crate::Validator) and
//! [`Builder`](crate::Builder), and build a fresh one per test when needed.
//!
//! ```rust
//! use fscomposer::Registry;
//!
//! let registry = Registry::with_builtins();
//! assert!(registry.is_registered("memfs"));
//! assert!(registry.get_schema("cachefs").is_ok());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ComposeError, NodeError, Result};
use crate::kind::{self, NodeCategory};
use crate::value::{Config, ConfigValue};
use crate::SharedFs;

/// Builds nodes by ID on behalf of a constructor.
///
/// Multiplexer constructors use it to obtain the filesystems their
/// configuration refers to. Resolution goes through the same memoized build
/// as the rest of the graph, so a node is never constructed twice.
pub trait Resolver {
    /// Build (or fetch the already-built) filesystem of `node_id`.
    fn resolve(&mut self, node_id: &str) -> Result<SharedFs>;
}

/// Constructor capability of a node type.
///
/// Receives the node's configuration, its underlying filesystem (`None` for
/// backends and multiplexers) and a [`Resolver`] for configuration-referenced
/// nodes.
pub type Constructor = Arc<
    dyn Fn(&Config, Option<SharedFs>, &mut dyn Resolver) -> Result<SharedFs, NodeError>
        + Send
        + Sync,
>;

/// Kind of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FieldKind {
    /// A string.
    String,
    /// A number (integer or float encoding).
    Int,
    /// A boolean.
    Bool,
    /// A string restricted to [`SchemaField::options`].
    Select,
    /// A list.
    List,
    /// A nested mapping.
    Map,
}

/// Description of one configuration field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SchemaField {
    /// Field name as it appears in the configuration.
    pub name: String,
    /// Field kind.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: FieldKind,
    /// Whether the field must be present.
    pub required: bool,
    /// Value used when the field is absent.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub default: Option<ConfigValue>,
    /// Human-readable description.
    pub description: String,
    /// Allowed values for [`FieldKind::Select`].
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub options: Vec<String>,
}

impl SchemaField {
    /// An optional field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            description: String::new(),
            options: Vec::new(),
        }
    }

    /// A select field restricted to `options`.
    pub fn select(name: impl Into<String>, options: &[&str]) -> Self {
        Self {
            options: options.iter().map(|o| (*o).to_owned()).collect(),
            ..Self::new(name, FieldKind::Select)
        }
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Configuration schema of a node type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NodeSchema {
    /// Node type name.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub node_type: String,
    /// Human-readable description.
    pub description: String,
    /// Configuration fields in presentation order.
    pub fields: Vec<SchemaField>,
}

impl NodeSchema {
    /// A schema with no fields.
    pub fn new(node_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Schema plus classification, for listing collaborators.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NodeTypeInfo {
    /// The registered schema.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub schema: NodeSchema,
    /// Category from the fixed classification.
    pub category: Option<NodeCategory>,
}

struct Entry {
    constructor: Constructor,
    schema: NodeSchema,
}

/// Table of registered node types.
///
/// Safe for concurrent readers. Registration takes a write lock and is
/// expected to happen before read traffic starts.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.list_types())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in node type registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::nodes::register_builtins(&registry);
        registry
    }

    /// Register (or replace) a node type. The last registration wins.
    ///
    /// The schema's `node_type` is set to `node_type`.
    pub fn register<F>(&self, node_type: impl Into<String>, constructor: F, mut schema: NodeSchema)
    where
        F: Fn(&Config, Option<SharedFs>, &mut dyn Resolver) -> Result<SharedFs, NodeError>
            + Send
            + Sync
            + 'static,
    {
        let node_type = node_type.into();
        schema.node_type = node_type.clone();
        tracing::debug!(node_type = %node_type, "registering node type");
        self.entries.write().insert(
            node_type,
            Entry {
                constructor: Arc::new(constructor),
                schema,
            },
        );
    }

    /// The constructor of `node_type`.
    ///
    /// # Errors
    ///
    /// [`ComposeError::UnknownNodeType`] if the type is not registered.
    pub fn get(&self, node_type: &str) -> Result<Constructor> {
        self.entries
            .read()
            .get(node_type)
            .map(|e| Arc::clone(&e.constructor))
            .ok_or_else(|| unknown(node_type))
    }

    /// The configuration schema of `node_type`.
    ///
    /// # Errors
    ///
    /// [`ComposeError::UnknownNodeType`] if the type is not registered.
    pub fn get_schema(&self, node_type: &str) -> Result<NodeSchema> {
        self.entries
            .read()
            .get(node_type)
            .map(|e| e.schema.clone())
            .ok_or_else(|| unknown(node_type))
    }

    /// Returns `true` if `node_type` is registered.
    pub fn is_registered(&self, node_type: &str) -> bool {
        self.entries.read().contains_key(node_type)
    }

    /// All registered type names, sorted.
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.entries.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Schema and category of `node_type`.
    pub fn describe(&self, node_type: &str) -> Result<NodeTypeInfo> {
        Ok(NodeTypeInfo {
            schema: self.get_schema(node_type)?,
            category: kind::category(node_type),
        })
    }
}

fn unknown(node_type: &str) -> ComposeError {
    ComposeError::UnknownNodeType {
        node: None,
        node_type: node_type.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::nodes::MemFs;

    fn mem_ctor(_: &Config, _: Option<SharedFs>, _: &mut dyn Resolver) -> Result<SharedFs, NodeError> {
        Ok(Arc::new(MemFs::new()))
    }

    #[test]
    fn unknown_type_lookups_fail() {
        let registry = Registry::new();
        assert_eq!(registry.get("memfs").err().unwrap().kind(), ErrorKind::UnknownNodeType);
        assert_eq!(
            registry.get_schema("memfs").unwrap_err().kind(),
            ErrorKind::UnknownNodeType
        );
        assert!(registry.list_types().is_empty());
    }

    #[test]
    fn last_registration_wins() {
        let registry = Registry::new();
        registry.register("memfs", mem_ctor, NodeSchema::new("ignored", "first"));
        registry.register("memfs", mem_ctor, NodeSchema::new("memfs", "second"));

        let schema = registry.get_schema("memfs").unwrap();
        assert_eq!(schema.node_type, "memfs");
        assert_eq!(schema.description, "second");
        assert_eq!(registry.list_types(), ["memfs"]);
    }

    #[test]
    fn builtins_have_described_schemas() {
        let registry = Registry::with_builtins();
        for expected in ["memfs", "osfs", "cachefs", "encryptfs", "metricsfs"] {
            assert!(registry.is_registered(expected), "{expected}");
        }
        for t in registry.list_types() {
            let info = registry.describe(&t).unwrap();
            assert_eq!(info.schema.node_type, t);
            assert!(!info.schema.description.is_empty(), "{t}");
            assert!(info.category.is_some(), "{t} is not classified");
        }
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();

        let registry = Arc::new(Registry::with_builtins());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&registry);
                std::thread::spawn(move || r.get_schema("cachefs").is_ok())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn schema_builder() {
        let schema = NodeSchema::new("cachefs", "cache")
            .field(SchemaField::select("policy", &["LRU", "LFU"]).default_value("LRU"));
        let field = schema.get_field("policy").unwrap();
        assert_eq!(field.kind, FieldKind::Select);
        assert_eq!(field.options, ["LRU", "LFU"]);
        assert_eq!(field.default, Some(ConfigValue::from("LRU")));
        assert!(!field.required);
    }
}
