//! Type-specific configuration rules.
//!
//! These run in addition to the registered schema. A type without an entry in
//! [`check`] only has to satisfy its schema.

use crate::error::{ComposeError, Result};
use crate::spec::{CompositionSpec, Node};
use crate::value::ConfigValue;

/// Cache eviction policies understood by `cachefs`.
pub(crate) const CACHE_POLICIES: &[&str] = &["LRU", "LFU", "ARC"];
/// Encryption algorithms understood by `encryptfs`.
pub(crate) const CIPHERS: &[&str] = &["AES-256-GCM", "ChaCha20-Poly1305"];
/// Key sources understood by `encryptfs`.
pub(crate) const KEY_SOURCES: &[&str] = &["env", "file"];
/// Levels understood by `logfs`.
pub(crate) const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub(super) fn check(node: &Node, spec: &CompositionSpec) -> Result<()> {
    match node.node_type.as_str() {
        "osfs" => osfs(node),
        "cachefs" => cachefs(node),
        "encryptfs" => encryptfs(node),
        "retryfs" => retryfs(node),
        "switchfs" => switchfs(node, spec),
        "unionfs" => unionfs(node, spec),
        "logfs" => logfs(node),
        _ => Ok(()),
    }
}

fn osfs(node: &Node) -> Result<()> {
    match string(node, "root")? {
        Some(root) if !root.is_empty() => Ok(()),
        _ => Err(ComposeError::config(&node.id, "root", "osfs requires a root directory")),
    }
}

fn cachefs(node: &Node) -> Result<()> {
    quantity(node, "maxBytes")?;
    quantity(node, "size")?;
    one_of(node, "policy", CACHE_POLICIES)?;
    boolean(node, "metadataCache")?;
    Ok(())
}

fn encryptfs(node: &Node) -> Result<()> {
    if one_of(node, "algorithm", CIPHERS)?.is_none() {
        return Err(ComposeError::config(&node.id, "algorithm", "is required"));
    }
    match one_of(node, "keySource", KEY_SOURCES)? {
        Some("env") => require_string(node, "keyEnv", "required when keySource is env"),
        Some(_) => require_string(node, "keyFile", "required when keySource is file"),
        None => Err(ComposeError::config(&node.id, "keySource", "is required")),
    }
}

fn retryfs(node: &Node) -> Result<()> {
    if quantity(node, "maxAttempts")? == Some(0) {
        return Err(ComposeError::config(&node.id, "maxAttempts", "must be at least 1"));
    }
    quantity(node, "backoffMs")?;
    Ok(())
}

fn switchfs(node: &Node, spec: &CompositionSpec) -> Result<()> {
    let routes = list(node, "routes")?.unwrap_or_default();
    if routes.is_empty() {
        return Err(ComposeError::config(&node.id, "routes", "at least one route is required"));
    }

    for (i, route) in routes.iter().enumerate() {
        let Some(route) = route.as_map() else {
            return Err(ComposeError::config(&node.id, "routes", format!("route {i} is not a map")));
        };
        let Some(target) = route.get("target").and_then(ConfigValue::as_str) else {
            return Err(ComposeError::config(&node.id, "routes", format!("route {i} missing 'target'")));
        };
        reference(node, spec, "routes", target)?;
        if route.get("pattern").and_then(ConfigValue::as_str).is_none() {
            return Err(ComposeError::config(&node.id, "routes", format!("route {i} missing 'pattern'")));
        }
    }

    if let Some(default) = string(node, "default")? {
        reference(node, spec, "default", default)?;
    }
    Ok(())
}

fn unionfs(node: &Node, spec: &CompositionSpec) -> Result<()> {
    let layers = list(node, "layers")?.unwrap_or_default();
    if layers.is_empty() {
        return Err(ComposeError::config(&node.id, "layers", "at least one layer is required"));
    }
    for (i, layer) in layers.iter().enumerate() {
        let Some(id) = layer.as_str() else {
            return Err(ComposeError::config(&node.id, "layers", format!("layer {i} is not a node id")));
        };
        reference(node, spec, "layers", id)?;
        if layers[..i].iter().any(|l| l.as_str() == Some(id)) {
            return Err(ComposeError::config(&node.id, "layers", format!("layer {id} listed twice")));
        }
    }
    Ok(())
}

fn logfs(node: &Node) -> Result<()> {
    one_of(node, "level", LOG_LEVELS)?;
    Ok(())
}

/// A configuration reference to another node: must exist and not be `node`.
fn reference(node: &Node, spec: &CompositionSpec, field: &str, target: &str) -> Result<()> {
    if target == node.id {
        return Err(ComposeError::config(&node.id, field, "a node cannot reference itself"));
    }
    if spec.get_node(target).is_none() {
        return Err(ComposeError::config(
            &node.id,
            field,
            format!("references unknown node {target}"),
        ));
    }
    Ok(())
}

fn present<'n>(node: &'n Node, field: &str) -> Option<&'n ConfigValue> {
    node.config
        .get(field)
        .filter(|v| !matches!(v, ConfigValue::Null))
}

fn string<'n>(node: &'n Node, field: &str) -> Result<Option<&'n str>> {
    match present(node, field) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| ComposeError::config(&node.id, field, "must be a string")),
    }
}

fn require_string(node: &Node, field: &str, reason: &str) -> Result<()> {
    match string(node, field)? {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(ComposeError::config(&node.id, field, reason)),
    }
}

fn boolean(node: &Node, field: &str) -> Result<Option<bool>> {
    match present(node, field) {
        None => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| ComposeError::config(&node.id, field, "must be a bool")),
    }
}

fn list<'n>(node: &'n Node, field: &str) -> Result<Option<&'n [ConfigValue]>> {
    match present(node, field) {
        None => Ok(None),
        Some(v) => v
            .as_list()
            .map(Some)
            .ok_or_else(|| ComposeError::config(&node.id, field, "must be a list")),
    }
}

fn quantity(node: &Node, field: &str) -> Result<Option<u64>> {
    match present(node, field) {
        None => Ok(None),
        Some(v) => v
            .to_quantity()
            .map(Some)
            .map_err(|m| ComposeError::config(&node.id, field, m.to_string())),
    }
}

fn one_of<'n>(node: &'n Node, field: &str, options: &[&str]) -> Result<Option<&'n str>> {
    match string(node, field)? {
        None => Ok(None),
        Some(s) if options.contains(&s) => Ok(Some(s)),
        Some(s) => Err(ComposeError::config(
            &node.id,
            field,
            format!("{s} is not one of: {}", options.join(", ")),
        )),
    }
}
