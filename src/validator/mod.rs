//! # Validator
//!
//! Checks a [`CompositionSpec`] for structural and semantic soundness.
//!
//! Passes run in a fixed order and stop at the first violation:
//!
//! 1. [`validate_structure`](Validator::validate_structure): required fields,
//!    unique IDs, known types, references resolve
//! 2. [`detect_cycles`](Validator::detect_cycles): the connection graph,
//!    every edge included, is acyclic
//! 3. [`validate_connections`](Validator::validate_connections): incoming
//!    connection counts fit each node's category
//! 4. [`validate_node_configs`](Validator::validate_node_configs): schema and
//!    type-specific configuration rules
//!
//! Only the first error is reported. A caller wanting every problem has to
//! fix and re-run.

use std::collections::{HashMap, HashSet};

use crate::error::{ComposeError, Result};
use crate::kind;
use crate::registry::{FieldKind, NodeSchema, Registry};
use crate::spec::{CompositionSpec, Node};
use crate::value::ConfigValue;

pub(crate) mod rules;

/// Validates one specification against a registry.
///
/// Holds only borrows; validating never modifies the specification, so
/// repeated calls give the same answer.
///
/// ```rust
/// use fscomposer::{CompositionSpec, MountDescriptor, Node, Registry, Validator};
///
/// let registry = Registry::with_builtins();
/// let spec = CompositionSpec::new("1.0", "mem")
///     .node(Node::new("mem", "memfs"))
///     .mount(MountDescriptor::new("api", "mem"));
///
/// assert!(Validator::new(&spec, &registry).validate_all().is_ok());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    spec: &'a CompositionSpec,
    registry: &'a Registry,
}

impl<'a> Validator<'a> {
    /// Create a validator for `spec`.
    pub fn new(spec: &'a CompositionSpec, registry: &'a Registry) -> Self {
        Self { spec, registry }
    }

    /// Run every pass, returning the first violation.
    #[tracing::instrument(skip_all, fields(spec = %self.spec.name))]
    pub fn validate_all(&self) -> Result<()> {
        self.validate_structure()?;
        self.detect_cycles()?;
        self.validate_connections()?;
        self.validate_node_configs()?;
        tracing::debug!(
            nodes = self.spec.nodes.len(),
            connections = self.spec.connections.len(),
            "specification valid"
        );
        Ok(())
    }

    /// Required fields, unique node IDs, classified types and resolvable
    /// references.
    pub fn validate_structure(&self) -> Result<()> {
        let spec = self.spec;
        if spec.version.is_empty() {
            return Err(ComposeError::malformed("version is required"));
        }
        if spec.name.is_empty() {
            return Err(ComposeError::malformed("name is required"));
        }
        if spec.nodes.is_empty() {
            return Err(ComposeError::malformed("at least one node is required"));
        }

        let mut ids = HashSet::with_capacity(spec.nodes.len());
        for (i, node) in spec.nodes.iter().enumerate() {
            if node.id.is_empty() {
                return Err(ComposeError::malformed(format!("node {i}: id is required")));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(ComposeError::malformed(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
            if node.node_type.is_empty() {
                return Err(ComposeError::malformed(format!(
                    "node {}: type is required",
                    node.id
                )));
            }
            if kind::category(&node.node_type).is_none() {
                return Err(ComposeError::UnknownNodeType {
                    node: Some(node.id.clone()),
                    node_type: node.node_type.clone(),
                });
            }
        }

        for (i, conn) in spec.connections.iter().enumerate() {
            for (end, id) in [("from", &conn.from), ("to", &conn.to)] {
                if !ids.contains(id.as_str()) {
                    return Err(ComposeError::DanglingReference {
                        location: format!("connection {i} '{end}'"),
                        node: id.clone(),
                    });
                }
            }
        }

        if spec.mount.root.trim().is_empty() {
            return Err(ComposeError::malformed("mount root is required"));
        }
        if !ids.contains(spec.mount.root.as_str()) {
            return Err(ComposeError::DanglingReference {
                location: "mount root".into(),
                node: spec.mount.root.clone(),
            });
        }
        if spec.mount.mount_type.is_empty() {
            return Err(ComposeError::malformed("mount type is required"));
        }
        Ok(())
    }

    /// Depth-first search for a back-edge over all connections.
    ///
    /// Edges into multiplexers are included even though the connection pass
    /// rejects them afterwards.
    pub fn detect_cycles(&self) -> Result<()> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for conn in &self.spec.connections {
            adjacency
                .entry(conn.from.as_str())
                .or_default()
                .push(conn.to.as_str());
        }

        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        for node in &self.spec.nodes {
            if visited.contains(node.id.as_str()) {
                continue;
            }
            if let Some(culprit) = find_back_edge(&node.id, &adjacency, &mut visited, &mut on_stack)
            {
                return Err(ComposeError::CycleDetected {
                    node: culprit.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Incoming connection counts per category.
    ///
    /// - backends take none
    /// - multiplexers take none (their inputs come from configuration)
    /// - other wrappers take exactly one
    pub fn validate_connections(&self) -> Result<()> {
        let spec = self.spec;
        let mut incoming: HashMap<&str, usize> = HashMap::new();
        for conn in &spec.connections {
            *incoming.entry(conn.to.as_str()).or_default() += 1;
        }
        let count = |id: &str| incoming.get(id).copied().unwrap_or(0);

        for conn in &spec.connections {
            let (Some(from), Some(to)) = (spec.get_node(&conn.from), spec.get_node(&conn.to))
            else {
                continue;
            };

            if kind::is_backend(&from.node_type) && count(&from.id) > 0 {
                return Err(ComposeError::arity(
                    &from.id,
                    &from.node_type,
                    "backend nodes cannot have incoming connections",
                ));
            }
            if kind::is_backend(&to.node_type) {
                return Err(ComposeError::arity(
                    &to.id,
                    &to.node_type,
                    "backend nodes cannot have incoming connections",
                ));
            }
            if kind::is_multiplexer(&to.node_type) {
                return Err(ComposeError::arity(
                    &to.id,
                    &to.node_type,
                    "multiplexer nodes reference their inputs in config, not via incoming connections",
                ));
            }
            if kind::is_wrapper(&to.node_type) && count(&to.id) > 1 {
                return Err(ComposeError::arity(
                    &to.id,
                    &to.node_type,
                    format!(
                        "wrapper nodes take exactly one incoming connection, found {}",
                        count(&to.id)
                    ),
                ));
            }
        }

        for node in &spec.nodes {
            if kind::is_wrapper(&node.node_type)
                && !kind::is_multiplexer(&node.node_type)
                && count(&node.id) == 0
            {
                return Err(ComposeError::arity(
                    &node.id,
                    &node.node_type,
                    "wrapper node has no incoming connection",
                ));
            }
        }
        Ok(())
    }

    /// Schema checks for registered types, then type-specific rules.
    ///
    /// A type with no specific rules only needs to satisfy its schema.
    pub fn validate_node_configs(&self) -> Result<()> {
        for node in &self.spec.nodes {
            if let Ok(schema) = self.registry.get_schema(&node.node_type) {
                check_schema(node, &schema)?;
            }
            rules::check(node, self.spec)?;
        }
        Ok(())
    }
}

fn find_back_edge<'s>(
    id: &'s str,
    adjacency: &HashMap<&'s str, Vec<&'s str>>,
    visited: &mut HashSet<&'s str>,
    on_stack: &mut HashSet<&'s str>,
) -> Option<&'s str> {
    visited.insert(id);
    on_stack.insert(id);

    for &next in adjacency.get(id).map(Vec::as_slice).unwrap_or_default() {
        if on_stack.contains(next) {
            return Some(next);
        }
        if !visited.contains(next) {
            if let Some(culprit) = find_back_edge(next, adjacency, visited, on_stack) {
                return Some(culprit);
            }
        }
    }

    on_stack.remove(id);
    None
}

fn check_schema(node: &Node, schema: &NodeSchema) -> Result<()> {
    for field in &schema.fields {
        let value = node
            .config
            .get(&field.name)
            .filter(|v| !matches!(v, ConfigValue::Null));
        let Some(value) = value else {
            if field.required && field.default.is_none() {
                return Err(ComposeError::config(&node.id, &field.name, "is required"));
            }
            continue;
        };

        let reason = match field.kind {
            FieldKind::String if value.as_str().is_none() => Some("must be a string".to_owned()),
            FieldKind::Bool if value.as_bool().is_none() => Some("must be a bool".to_owned()),
            FieldKind::Int => value.to_i64().err().map(|m| m.to_string()),
            FieldKind::List if value.as_list().is_none() => Some("must be a list".to_owned()),
            FieldKind::Map if value.as_map().is_none() => Some("must be a map".to_owned()),
            FieldKind::Select => match value.as_str() {
                Some(s) if field.options.iter().any(|o| o == s) => None,
                _ => Some(format!("must be one of: {}", field.options.join(", "))),
            },
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(ComposeError::config(&node.id, &field.name, reason));
        }
    }
    Ok(())
}
