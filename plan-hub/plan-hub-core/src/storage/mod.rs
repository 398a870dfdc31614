//! Tree-structured node repository.
//!
//! Placement is encoded in each node's `ancestors` list, so a subtree scan is a
//! prefix match on that list at the parent's depth. Writes are single-document
//! atomic operations; `conditional_update` only applies when the stored version
//! matches the caller's expectation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::{AccessControl, AccessGrant, Content, Node};

pub mod memory;


pub use memory::MemoryNodeStore;

/// Which fields a read returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Metadata only; content comes back empty.
    Sparse,
    Full,
}

/// Optimistic-concurrency expectation for a write. On the wire `-1` means
/// [`ExpectedVersion::Any`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ExpectedVersion {
    Exact(u64),
    Any,
}

pub const SKIP_VERSION_CHECK: i64 = -1;

impl From<i64> for ExpectedVersion {
    fn from(raw: i64) -> Self {
        u64::try_from(raw).map_or(ExpectedVersion::Any, ExpectedVersion::Exact)
    }
}

impl From<ExpectedVersion> for i64 {
    fn from(v: ExpectedVersion) -> Self {
        match v {
            ExpectedVersion::Exact(n) => i64::try_from(n).unwrap_or(i64::MAX),
            ExpectedVersion::Any => SKIP_VERSION_CHECK,
        }
    }
}

impl ExpectedVersion {
    pub fn matches(&self, stored: u64) -> bool {
        match self {
            ExpectedVersion::Exact(v) => *v == stored,
            ExpectedVersion::Any => true,
        }
    }
}

/// Field changes applied by a conditional update. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeChanges {
    pub name: Option<String>,
    pub content: Option<Content>,
    pub ancestors: Option<Vec<String>>,
    pub access_control: Option<AccessControl>,
    pub acl: Option<Vec<AccessGrant>>,
    pub process_dependencies: Option<Vec<String>>,
    pub modified_by: Option<String>,
}

impl NodeChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.content.is_none()
            && self.ancestors.is_none()
            && self.access_control.is_none()
            && self.acl.is_none()
            && self.process_dependencies.is_none()
    }

    /// Apply to `node`, bumping its version and modification stamp.
    pub fn apply_to(self, node: &mut Node, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            node.name = name;
        }
        if let Some(content) = self.content {
            node.content = content;
        }
        if let Some(ancestors) = self.ancestors {
            node.ancestors = ancestors;
        }
        if let Some(mode) = self.access_control {
            node.access_control = mode;
        }
        if let Some(acl) = self.acl {
            node.acl = acl;
        }
        if let Some(deps) = self.process_dependencies {
            node.process_dependencies = deps;
        }
        if let Some(by) = self.modified_by {
            node.last_modified_by = by;
        }
        node.version += 1;
        node.last_modified_at = now;
    }
}

#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Return the synthetic root, creating it on first use.
    async fn ensure_root(&self, owner: &str, access_control: AccessControl) -> Result<Node>;

    async fn get(&self, id: &str, projection: Projection) -> Result<Option<Node>>;

    /// Batched point lookup; missing ids are skipped.
    async fn get_many(&self, ids: &[String], projection: Projection) -> Result<Vec<Node>>;

    /// Nodes below `parent_id`. Direct children only unless
    /// `ignore_depth_limit`, in which case the whole subtree is returned
    /// ordered by depth.
    async fn get_children(
        &self,
        parent_id: &str,
        parent_depth: usize,
        projection: Projection,
        ignore_depth_limit: bool,
    ) -> Result<Vec<Node>>;

    /// Insert a new node; fails with `DocumentExists` if the id is taken.
    async fn insert(&self, node: Node) -> Result<()>;

    /// Atomically apply `changes` if the stored version matches `expected`.
    /// Returns the updated node, `VersionConflict` on mismatch, `NotFound`
    /// when the id is unknown.
    async fn conditional_update(
        &self,
        id: &str,
        expected: ExpectedVersion,
        changes: NodeChanges,
    ) -> Result<Node>;

    /// Trash or restore a single node without touching its version.
    async fn set_trashed(&self, id: &str, trashed: bool, at: Option<DateTime<Utc>>) -> Result<Node>;

    /// Trashed nodes at or below `root_id`.
    async fn list_trashed(&self, root_id: &str) -> Result<Vec<Node>>;

    /// Nodes whose `process_dependencies` mention any of `ids`.
    async fn find_dependents(&self, ids: &[String]) -> Result<Vec<Node>>;

    async fn delete_many(&self, ids: &[String]) -> Result<usize>;

    async fn descendants(&self, node: &Node, projection: Projection) -> Result<Vec<Node>> {
        self.get_children(&node.id, node.depth(), projection, true).await
    }
}
