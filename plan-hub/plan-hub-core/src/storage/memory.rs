//! In-process node store. Every operation takes the map lock once, which gives
//! the single-document atomicity the trait promises.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{ExpectedVersion, NodeChanges, NodeStore, Projection};
use crate::error::{HubError, Result};
use crate::node::{AccessControl, Node, ROOT_ID};

#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<HashMap<String, Node>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn project(node: &Node, projection: Projection) -> Node {
        match projection {
            Projection::Full => node.clone(),
            Projection::Sparse => node.clone().sparse(),
        }
    }

    fn is_below(node: &Node, parent_id: &str, parent_depth: usize, whole_subtree: bool) -> bool {
        if node.ancestors.get(parent_depth).map(String::as_str) != Some(parent_id) {
            return false;
        }
        whole_subtree || node.ancestors.len() == parent_depth + 1
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn ensure_root(&self, owner: &str, access_control: AccessControl) -> Result<Node> {
        let mut nodes = self.nodes.write();
        let root = nodes
            .entry(ROOT_ID.to_string())
            .or_insert_with(|| Node::root(owner, access_control));
        Ok(root.clone())
    }

    async fn get(&self, id: &str, projection: Projection) -> Result<Option<Node>> {
        Ok(self
            .nodes
            .read()
            .get(id)
            .map(|n| Self::project(n, projection)))
    }

    async fn get_many(&self, ids: &[String], projection: Projection) -> Result<Vec<Node>> {
        let nodes = self.nodes.read();
        Ok(ids
            .iter()
            .filter_map(|id| nodes.get(id))
            .map(|n| Self::project(n, projection))
            .collect())
    }

    async fn get_children(
        &self,
        parent_id: &str,
        parent_depth: usize,
        projection: Projection,
        ignore_depth_limit: bool,
    ) -> Result<Vec<Node>> {
        let nodes = self.nodes.read();
        let mut out: Vec<Node> = nodes
            .values()
            .filter(|n| Self::is_below(n, parent_id, parent_depth, ignore_depth_limit))
            .map(|n| Self::project(n, projection))
            .collect();
        out.sort_by(|a, b| {
            a.ancestors
                .len()
                .cmp(&b.ancestors.len())
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn insert(&self, node: Node) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.id) {
            return Err(HubError::DocumentExists(format!("id {} is taken", node.id)));
        }
        nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn conditional_update(
        &self,
        id: &str,
        expected: ExpectedVersion,
        changes: NodeChanges,
    ) -> Result<Node> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| HubError::not_found(format!("node {id}")))?;
        if !expected.matches(node.version) {
            return Err(HubError::VersionConflict {
                id: id.to_string(),
                expected: match expected {
                    ExpectedVersion::Exact(v) => v,
                    ExpectedVersion::Any => node.version,
                },
                actual: node.version,
            });
        }
        changes.apply_to(node, Utc::now());
        Ok(node.clone())
    }

    async fn set_trashed(&self, id: &str, trashed: bool, at: Option<DateTime<Utc>>) -> Result<Node> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| HubError::not_found(format!("node {id}")))?;
        node.trashed = Some(trashed);
        node.trashed_at = if trashed { at.or_else(|| Some(Utc::now())) } else { None };
        Ok(node.clone())
    }

    async fn list_trashed(&self, root_id: &str) -> Result<Vec<Node>> {
        let nodes = self.nodes.read();
        let mut out: Vec<Node> = nodes
            .values()
            .filter(|n| n.is_trashed())
            .filter(|n| n.id == root_id || n.ancestors.iter().any(|a| a == root_id))
            .map(|n| n.clone().sparse())
            .collect();
        out.sort_by(|a, b| b.trashed_at.cmp(&a.trashed_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn find_dependents(&self, ids: &[String]) -> Result<Vec<Node>> {
        let nodes = self.nodes.read();
        Ok(nodes
            .values()
            .filter(|n| n.process_dependencies.iter().any(|d| ids.contains(d)))
            .cloned()
            .collect())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize> {
        let mut nodes = self.nodes.write();
        Ok(ids.iter().filter(|id| nodes.remove(id.as_str()).is_some()).count())
    }
}
