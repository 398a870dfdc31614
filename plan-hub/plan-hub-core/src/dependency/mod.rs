//! Cross-node references carried in node content.
//!
//! Model processes of type `GRAPH_MODEL` and simulations point at other nodes.
//! This module extracts those references, folds already-computed dependency
//! lists of the referenced nodes into a transitive closure, detects ports that
//! an edit would leave dangling in other graphs, and rewrites references when
//! a subtree is duplicated.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HubError, Result};
use crate::node::{Content, Node, NodeType};

#[cfg(test)]
mod tests;

pub const GRAPH_MODEL: &str = "GRAPH_MODEL";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingMode {
    /// Pinned to a release number.
    Fixed,
    /// Newest release, or the live node while none exists.
    LatestRelease,
    #[default]
    CurrentVersion,
}

/// One outgoing reference, keyed the way lookups resolve it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reference {
    pub node_id: String,
    pub tracking: TrackingMode,
    pub release: Option<u64>,
}

impl Reference {
    pub fn current(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            tracking: TrackingMode::CurrentVersion,
            release: None,
        }
    }

    fn from_fields(node_id: &str, tracking: Option<&Value>, release: Option<&Value>) -> Self {
        let tracking = tracking
            .and_then(|t| serde_json::from_value::<TrackingMode>(t.clone()).ok())
            .unwrap_or_default();
        let release = match tracking {
            TrackingMode::Fixed => release.and_then(Value::as_u64),
            _ => None,
        };
        Self {
            node_id: node_id.to_string(),
            tracking,
            release,
        }
    }
}

/// Resolves a reference to the dependency list of the node it lands on.
pub trait DependencyLookup {
    fn resolve(&self, reference: &Reference) -> Option<Vec<String>>;
}

impl DependencyLookup for HashMap<Reference, Vec<String>> {
    fn resolve(&self, reference: &Reference) -> Option<Vec<String>> {
        self.get(reference).cloned()
    }
}

fn graph_processes(content: &Content) -> impl Iterator<Item = (&String, &serde_json::Map<String, Value>)> {
    content
        .get("processes")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|m| m.iter())
        .filter_map(|(pid, p)| p.as_object().map(|p| (pid, p)))
        .filter(|(_, p)| p.get("type").and_then(Value::as_str) == Some(GRAPH_MODEL))
}

/// Direct references declared by the content of a node of `node_type`.
pub fn shallow_references(node_type: NodeType, content: &Content) -> Vec<Reference> {
    let mut refs: Vec<Reference> = Vec::new();
    let mut push = |r: Reference| {
        if !refs.contains(&r) {
            refs.push(r);
        }
    };
    if node_type.is_model() {
        for (_, process) in graph_processes(content) {
            if let Some(target) = process.get("ref").and_then(Value::as_str) {
                push(Reference::from_fields(
                    target,
                    process.get("tracking"),
                    process.get("release"),
                ));
            }
        }
    } else if node_type == NodeType::Simulation {
        if let Some(model) = content.get("ref").and_then(Value::as_str) {
            push(Reference::from_fields(
                model,
                content.get("tracking"),
                content.get("release"),
            ));
        }
        for sheet in content
            .get("forecastSheets")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            push(Reference::current(sheet));
        }
    }
    refs
}

/// Ids referenced directly, de-duplicated in declaration order.
pub fn shallow_dependencies(node_type: NodeType, content: &Content) -> Vec<String> {
    dedup(shallow_references(node_type, content).into_iter().map(|r| r.node_id))
}

/// Transitive dependency set. Models fold in every referenced node's own
/// dependency list; other types only report their direct references.
pub fn deep_dependencies(
    node_type: NodeType,
    content: &Content,
    lookup: &impl DependencyLookup,
) -> Result<Vec<String>> {
    let refs = shallow_references(node_type, content);
    if !node_type.is_model() {
        return Ok(dedup(refs.into_iter().map(|r| r.node_id)));
    }
    let mut out = Vec::new();
    for reference in &refs {
        let nested = lookup.resolve(reference).ok_or_else(|| {
            HubError::InvalidDependency(format!(
                "cannot resolve {} ({:?}{})",
                reference.node_id,
                reference.tracking,
                reference
                    .release
                    .map(|r| format!(" release {r}"))
                    .unwrap_or_default()
            ))
        })?;
        out.extend(nested);
        out.push(reference.node_id.clone());
    }
    Ok(dedup(out))
}

pub fn check_acyclic(node_id: &str, dependencies: &[String]) -> Result<()> {
    if dependencies.iter().any(|d| d == node_id) {
        return Err(HubError::CyclicDependency(format!(
            "node {node_id} depends on itself"
        )));
    }
    Ok(())
}

fn dedup(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Port ids declared on a model's inports and outports.
pub fn declared_ports(content: &Content) -> BTreeSet<String> {
    ["inports", "outports"]
        .iter()
        .filter_map(|key| content.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(|port| port.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Ports present in `old` but gone from `new`.
pub fn removed_ports(old: &Content, new: &Content) -> Vec<String> {
    let after = declared_ports(new);
    declared_ports(old)
        .into_iter()
        .filter(|p| !after.contains(p))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortUsage {
    pub node_id: String,
    pub process_id: String,
    pub port: String,
}

/// Connections in `dependent` that still use a removed port of `model_id`
/// through a process tracking the live model.
pub fn dangling_port_usages(model_id: &str, removed: &[String], dependent: &Node) -> Vec<PortUsage> {
    if removed.is_empty() {
        return Vec::new();
    }
    let tracking_live: HashSet<&str> = graph_processes(&dependent.content)
        .filter(|(_, p)| p.get("ref").and_then(Value::as_str) == Some(model_id))
        .filter(|(_, p)| {
            Reference::from_fields(model_id, p.get("tracking"), p.get("release")).tracking
                != TrackingMode::Fixed
        })
        .map(|(pid, _)| pid.as_str())
        .collect();
    if tracking_live.is_empty() {
        return Vec::new();
    }
    let mut usages = Vec::new();
    for conn in dependent
        .content
        .get("connections")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        for end in ["from", "to"] {
            let Some(endpoint) = conn.get(end) else { continue };
            let process = endpoint.get("process").and_then(Value::as_str);
            let port = endpoint.get("port").and_then(Value::as_str);
            if let (Some(process), Some(port)) = (process, port) {
                if tracking_live.contains(process) && removed.iter().any(|r| r == port) {
                    usages.push(PortUsage {
                        node_id: dependent.id.clone(),
                        process_id: process.to_string(),
                        port: port.to_string(),
                    });
                }
            }
        }
    }
    usages
}

/// Rewrite references through `id_map` (old id → new id). Ids missing from
/// the map are left untouched.
pub fn update_dependencies(
    content: &mut Content,
    dependencies: &mut Vec<String>,
    id_map: &HashMap<String, String>,
) {
    let remap = |value: &mut Value| {
        if let Some(new_id) = value.as_str().and_then(|old| id_map.get(old)) {
            *value = Value::String(new_id.clone());
        }
    };
    if let Some(processes) = content.get_mut("processes").and_then(Value::as_object_mut) {
        for process in processes.values_mut().filter_map(Value::as_object_mut) {
            if let Some(target) = process.get_mut("ref") {
                remap(target);
            }
        }
    }
    if let Some(target) = content.get_mut("ref") {
        remap(target);
    }
    if let Some(sheets) = content.get_mut("forecastSheets").and_then(Value::as_array_mut) {
        sheets.iter_mut().for_each(remap);
    }
    for dep in dependencies.iter_mut() {
        if let Some(new_id) = id_map.get(dep) {
            *dep = new_id.clone();
        }
    }
}
