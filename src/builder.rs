//! # Builder
//!
//! Turns a validated [`CompositionSpec`] into a live [`SharedFs`].
//!
//! Construction is a memoized post-order walk from the mount root: a node is
//! built after the node it wraps, and at most once per [`Builder::build`]
//! call even when several nodes depend on it. Multiplexers receive no
//! underlying filesystem and pull the nodes named in their configuration
//! through the [`Resolver`] passed to every constructor, backed by the same
//! memo table.
//!
//! Every failure aborts the whole build. Nothing constructed during a failed
//! build is returned.

use std::collections::HashMap;

use crate::error::{ComposeError, Result};
use crate::kind;
use crate::registry::{Registry, Resolver};
use crate::spec::CompositionSpec;
use crate::validator::Validator;
use crate::SharedFs;

/// Builds the filesystem described by one specification.
///
/// ```rust
/// use fscomposer::{Builder, CompositionSpec, FsRead, FsWrite, MountDescriptor, Node, Registry};
/// use std::path::Path;
///
/// let registry = Registry::with_builtins();
/// let spec = CompositionSpec::new("1.0", "cached")
///     .node(Node::new("mem", "memfs"))
///     .node(Node::new("cache", "cachefs").with("maxBytes", 1048576))
///     .connect("mem", "cache")
///     .mount(MountDescriptor::new("api", "cache"));
///
/// let fs = Builder::new(&spec, &registry).build()?;
/// fs.write(Path::new("/hello.txt"), b"hello")?;
/// assert_eq!(fs.read(Path::new("/hello.txt"))?, b"hello");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Builder<'a> {
    spec: &'a CompositionSpec,
    registry: &'a Registry,
}

impl<'a> Builder<'a> {
    /// Create a builder for `spec`.
    pub fn new(spec: &'a CompositionSpec, registry: &'a Registry) -> Self {
        Self { spec, registry }
    }

    /// Validate, then build the mount root.
    #[tracing::instrument(skip_all, fields(spec = %self.spec.name, root = %self.spec.mount.root))]
    pub fn build(&self) -> Result<SharedFs> {
        Validator::new(self.spec, self.registry).validate_all()?;

        let root = self.spec.mount.root.as_str();
        if root.trim().is_empty() {
            return Err(ComposeError::EmptyMountRoot);
        }

        let mut session = Session::new(self.spec, self.registry);
        let fs = session.build_node(root)?;
        tracing::info!(built = session.slots.len(), "composition built");
        Ok(fs)
    }

    /// Validate, then build every node in declaration order.
    ///
    /// Surfaces construction errors for nodes the mount root does not reach.
    /// All nodes share one memo table.
    pub fn build_all(&self) -> Result<Vec<(String, SharedFs)>> {
        Validator::new(self.spec, self.registry).validate_all()?;

        let mut session = Session::new(self.spec, self.registry);
        let mut built = Vec::with_capacity(self.spec.nodes.len());
        for node in &self.spec.nodes {
            built.push((node.id.clone(), session.build_node(&node.id)?));
        }
        tracing::info!(built = built.len(), "all nodes built");
        Ok(built)
    }
}

enum Slot {
    InProgress,
    Built(SharedFs),
}

/// Memo table for one build call.
struct Session<'a> {
    spec: &'a CompositionSpec,
    registry: &'a Registry,
    slots: HashMap<String, Slot>,
}

impl<'a> Session<'a> {
    fn new(spec: &'a CompositionSpec, registry: &'a Registry) -> Self {
        Self {
            spec,
            registry,
            slots: HashMap::new(),
        }
    }

    fn build_node(&mut self, id: &str) -> Result<SharedFs> {
        match self.slots.get(id) {
            Some(Slot::Built(fs)) => return Ok(SharedFs::clone(fs)),
            Some(Slot::InProgress) => {
                return Err(ComposeError::CycleDetected { node: id.to_owned() });
            }
            None => {}
        }

        let spec = self.spec;
        let node = spec
            .get_node(id)
            .ok_or_else(|| ComposeError::NodeNotFound(id.to_owned()))?;
        let constructor = self
            .registry
            .get(&node.node_type)
            .map_err(|_| ComposeError::UnknownNodeType {
                node: Some(node.id.clone()),
                node_type: node.node_type.clone(),
            })?;

        self.slots.insert(node.id.clone(), Slot::InProgress);

        let underlying = if kind::is_multiplexer(&node.node_type) {
            None
        } else {
            let mut incoming = spec.incoming(&node.id);
            match (incoming.next(), incoming.next()) {
                (Some(conn), None) => Some(self.build_node(&conn.from)?),
                (None, _) if kind::is_backend(&node.node_type) => None,
                (None, _) => {
                    return Err(ComposeError::Internal(format!(
                        "wrapper node {} has no incoming connection",
                        node.id
                    )));
                }
                (Some(_), Some(_)) => {
                    return Err(ComposeError::Internal(format!(
                        "node {} has more than one incoming connection",
                        node.id
                    )));
                }
            }
        };

        tracing::debug!(
            node = %node.id,
            node_type = %node.node_type,
            wraps = underlying.is_some(),
            "constructing node"
        );
        let fs = constructor(&node.config, underlying, &mut *self).map_err(|source| {
            ComposeError::ConstructionFailure {
                node: node.id.clone(),
                node_type: node.node_type.clone(),
                source,
            }
        })?;

        self.slots
            .insert(node.id.clone(), Slot::Built(SharedFs::clone(&fs)));
        Ok(fs)
    }
}

impl Resolver for Session<'_> {
    fn resolve(&mut self, node_id: &str) -> Result<SharedFs> {
        self.build_node(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;
    use crate::nodes::MemFs;
    use crate::registry::NodeSchema;
    use crate::{Config, ErrorKind, MountDescriptor, Node};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_registry() -> (Registry, Arc<AtomicUsize>) {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register(
            "memfs",
            move |_: &Config, _: Option<SharedFs>, _: &mut dyn Resolver| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemFs::new()) as SharedFs)
            },
            NodeSchema::new("memfs", "counting memfs"),
        );
        registry.register(
            "metricsfs",
            |_: &Config, fs: Option<SharedFs>, _: &mut dyn Resolver| {
                fs.ok_or(NodeError::MissingUnderlying)
            },
            NodeSchema::new("metricsfs", "pass-through"),
        );
        (registry, calls)
    }

    #[test]
    fn build_is_post_order_and_memoized() {
        let (registry, calls) = counting_registry();
        let spec = CompositionSpec::new("1.0", "t")
            .node(Node::new("m", "memfs"))
            .node(Node::new("w", "metricsfs"))
            .connect("m", "w")
            .mount(MountDescriptor::new("api", "w"));

        let all = Builder::new(&spec, &registry).build_all().unwrap();
        let ids: Vec<_> = all.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["m", "w"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Each build call has its own memo table.
        Builder::new(&spec, &registry).build().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn build_revalidates() {
        let (registry, _) = counting_registry();
        let spec = CompositionSpec::new("1.0", "t")
            .node(Node::new("w", "metricsfs"))
            .mount(MountDescriptor::new("api", "w"));
        let err = Builder::new(&spec, &registry).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ArityViolation);
    }

    #[test]
    fn unregistered_but_classified_type_fails_build() {
        let registry = Registry::new();
        let spec = CompositionSpec::new("1.0", "t")
            .node(Node::new("s3", "s3fs"))
            .mount(MountDescriptor::new("api", "s3"));
        assert!(Validator::new(&spec, &registry).validate_all().is_ok());
        let err = Builder::new(&spec, &registry).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownNodeType);
        assert!(err.to_string().contains("node s3"));
    }

    #[test]
    fn constructor_error_names_node() {
        let registry = Registry::new();
        registry.register(
            "memfs",
            |_: &Config, _: Option<SharedFs>, _: &mut dyn Resolver| {
                Err(NodeError::Unsupported("offline".into()))
            },
            NodeSchema::new("memfs", "broken"),
        );
        let spec = CompositionSpec::new("1.0", "t")
            .node(Node::new("disk", "memfs"))
            .mount(MountDescriptor::new("api", "disk"));

        let err = Builder::new(&spec, &registry).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
        assert_eq!(
            err.to_string(),
            "failed to construct node disk (memfs): unsupported: offline"
        );
    }

    #[test]
    fn resolving_an_in_progress_node_is_a_cycle() {
        let registry = Registry::new();
        registry.register(
            "unionfs",
            |config: &Config, _: Option<SharedFs>, resolver: &mut dyn Resolver| {
                let target = config["layers"].as_list().unwrap()[0].as_str().unwrap();
                Ok(resolver.resolve(target)?)
            },
            NodeSchema::new("unionfs", "self-referencing"),
        );
        let spec = CompositionSpec::new("1.0", "t")
            .node(Node::new("u", "unionfs").with("layers", vec!["u"]));
        let mut session = Session::new(&spec, &registry);
        let err = session.build_node("u").err().unwrap();
        let ComposeError::ConstructionFailure { source, .. } = err else {
            panic!("expected construction failure");
        };
        let NodeError::Resolve(inner) = source else {
            panic!("expected resolve failure");
        };
        assert_eq!(inner.kind(), ErrorKind::CycleDetected);
    }

    #[test]
    fn missing_node_is_reported() {
        let registry = Registry::new();
        let spec = CompositionSpec::new("1.0", "t");
        let mut session = Session::new(&spec, &registry);
        assert_eq!(
            session.build_node("nope").err().unwrap().kind(),
            ErrorKind::NodeNotFound
        );
    }
}
