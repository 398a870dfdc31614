//! Document lifecycle orchestration.
//!
//! `NodeService` composes the node store, the snapshot log and the principal
//! directory. Every operation follows the same shape: resolve the caller's
//! groups, load the target, fetch its ancestor chain in one batched read,
//! check permissions, validate, then write. Cascades are sequences of
//! single-document writes; a failure part way through is reported with the
//! offending node id and nothing is rolled back.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access;
use crate::combined_id::CombinedId;
use crate::dependency::{self, Reference, TrackingMode};
use crate::directory::PrincipalDirectory;
use crate::error::{HubError, Result};
use crate::events::EventBus;
use crate::history::{MemorySnapshotLog, SnapshotLog};
use crate::node::{AccessControl, AccessGrant, AppUser, Content, Node, NodeType, Permission, PermissionSet, PrincipalType};
use crate::storage::{ExpectedVersion, MemoryNodeStore, NodeStore, Projection};
use crate::trash;
use crate::validator;

mod create;
mod history;
mod read;
mod removal;
mod structure;
mod update;

pub use create::CreateNode;
pub use read::{GetOptions, NodeView};
pub use update::UpdateNode;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Owner recorded on the synthetic root when it is first created.
    pub root_owner: String,
    pub root_access: AccessControl,
    /// Version snapshots closer together than this may be collapsed.
    pub prune_window_secs: u64,
    pub copy_suffix: String,
    /// Upper bound on ` (n)` suffixes tried when deduplicating a name.
    pub max_name_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_owner: "admin".into(),
            root_access: AccessControl::PublicReadWrite,
            prune_window_secs: 300,
            copy_suffix: " - copy".into(),
            max_name_attempts: 1000,
        }
    }
}

impl ServiceConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn prune_window(&self) -> Duration {
        Duration::seconds(self.prune_window_secs.min(i32::MAX as u64) as i64)
    }
}

#[derive(Clone)]
pub struct NodeService {
    store: Arc<dyn NodeStore>,
    log: Arc<dyn SnapshotLog>,
    directory: Arc<dyn PrincipalDirectory>,
    events: EventBus,
    config: ServiceConfig,
}

impl NodeService {
    pub fn new(
        store: Arc<dyn NodeStore>,
        log: Arc<dyn SnapshotLog>,
        directory: Arc<dyn PrincipalDirectory>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            log,
            directory,
            events: EventBus::new(),
            config,
        }
    }

    /// Service over the in-memory store and log.
    pub fn in_memory(directory: Arc<dyn PrincipalDirectory>, config: ServiceConfig) -> Self {
        Self::new(
            Arc::new(MemoryNodeStore::new()),
            Arc::new(MemorySnapshotLog::new()),
            directory,
            config,
        )
    }

    /// Create the synthetic root if the store does not have one yet.
    pub async fn init(&self) -> Result<Node> {
        self.store
            .ensure_root(&self.config.root_owner, self.config.root_access)
            .await
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn group_ids(&self, user: &AppUser) -> Result<Vec<String>> {
        if user.id.trim().is_empty() {
            return Err(HubError::not_found("user"));
        }
        self.directory.group_ids_for_user(&user.id).await
    }

    async fn live(&self, id: &str, projection: Projection) -> Result<Node> {
        self.store
            .get(id, projection)
            .await?
            .ok_or_else(|| HubError::not_found(format!("node {id}")))
    }

    /// Parse `raw` and insist it addresses a live node rather than history.
    fn live_id(raw: &str) -> Result<String> {
        let id = CombinedId::parse(raw)?;
        if !id.is_node() {
            return Err(HubError::BadRequest(format!(
                "{raw} addresses a historical entry"
            )));
        }
        Ok(id.base_id)
    }

    async fn chain(&self, node: &Node) -> Result<Vec<Node>> {
        self.store.get_many(&node.ancestors, Projection::Sparse).await
    }

    /// Effective permissions on `node`, together with the ancestor chain used
    /// to resolve them.
    async fn resolve(
        &self,
        user: &AppUser,
        node: &Node,
        groups: &[String],
    ) -> Result<(PermissionSet, Vec<Node>)> {
        let chain = self.chain(node).await?;
        let perms = access::permissions(user, node, &chain, groups)?;
        Ok((perms, chain))
    }

    /// Missing READ hides the node entirely; anything else is a plain refusal.
    fn require(perms: PermissionSet, permission: Permission, node: &Node) -> Result<()> {
        if !perms.contains(Permission::Read) {
            return Err(HubError::not_found(format!("node {}", node.id)));
        }
        if !perms.contains(permission) {
            return Err(HubError::forbidden(format!(
                "{permission:?} on node {}",
                node.id
            )));
        }
        Ok(())
    }

    async fn authorize(
        &self,
        user: &AppUser,
        node: &Node,
        groups: &[String],
        permission: Permission,
    ) -> Result<Vec<Node>> {
        let (perms, chain) = self.resolve(user, node, groups).await?;
        Self::require(perms, permission, node)?;
        Ok(chain)
    }

    fn ensure_live(node: &Node) -> Result<()> {
        trash::ensure_state(node, false)
    }

    async fn check_principals(&self, acl: &[AccessGrant]) -> Result<()> {
        let lookups = acl
            .iter()
            .filter(|grant| grant.principal_type != PrincipalType::All)
            .map(|grant| async move {
                let id = grant.principal().unwrap_or_default();
                if self.directory.principal_exists(grant.principal_type, id).await? {
                    Ok::<_, HubError>(())
                } else {
                    Err(HubError::invalid(format!(
                        "unknown {:?} principal {id}",
                        grant.principal_type
                    )))
                }
            });
        try_join_all(lookups).await?;
        Ok(())
    }

    async fn live_siblings(&self, parent: &Node, exclude: Option<&str>) -> Result<Vec<Node>> {
        let children = self
            .store
            .get_children(&parent.id, parent.depth(), Projection::Sparse, false)
            .await?;
        Ok(trash::filter_trashed(children, false)
            .into_iter()
            .filter(|n| Some(n.id.as_str()) != exclude)
            .collect())
    }

    async fn name_taken(&self, parent: &Node, name: &str, exclude: Option<&str>) -> Result<bool> {
        Ok(self
            .live_siblings(parent, exclude)
            .await?
            .iter()
            .any(|n| n.name == name))
    }

    /// `desired`, or the first free `desired (n)` among live children of `parent`.
    async fn unique_name(&self, parent: &Node, desired: &str) -> Result<String> {
        let siblings = self.live_siblings(parent, None).await?;
        let taken = |name: &str| siblings.iter().any(|n| n.name == name);
        if !taken(desired) {
            return Ok(desired.to_string());
        }
        for n in 1..=self.config.max_name_attempts {
            let candidate = format!("{desired} ({n})");
            if !taken(&candidate) {
                debug!(parent = %parent.id, %candidate, "deduplicated sibling name");
                return Ok(candidate);
            }
        }
        Err(HubError::DocumentExists(format!(
            "no free name like {desired} under {}",
            parent.id
        )))
    }

    async fn live_dependencies(&self, id: &str) -> Result<Option<Vec<String>>> {
        Ok(self
            .store
            .get(id, Projection::Sparse)
            .await?
            .filter(|n| !n.is_trashed() && n.node_type.is_model())
            .map(|n| n.process_dependencies))
    }

    /// Resolve each reference of `content` to the dependency list it lands on.
    async fn dependency_lookup(
        &self,
        node_type: NodeType,
        content: &Content,
    ) -> Result<HashMap<Reference, Vec<String>>> {
        let mut lookup = HashMap::new();
        if !node_type.is_model() {
            return Ok(lookup);
        }
        for reference in dependency::shallow_references(node_type, content) {
            let resolved = match reference.tracking {
                TrackingMode::Fixed => match reference.release {
                    Some(n) => self
                        .log
                        .find_release(&reference.node_id, n)
                        .await?
                        .map(|s| s.process_dependencies),
                    None => None,
                },
                TrackingMode::LatestRelease => {
                    match self.log.find_latest_release(&reference.node_id).await? {
                        Some(release) => Some(release.process_dependencies),
                        None => self.live_dependencies(&reference.node_id).await?,
                    }
                }
                TrackingMode::CurrentVersion => self.live_dependencies(&reference.node_id).await?,
            };
            if let Some(deps) = resolved {
                lookup.insert(reference, deps);
            }
        }
        Ok(lookup)
    }

    /// Deep dependencies of `content` as it would be stored on node `id`.
    async fn compute_dependencies(
        &self,
        id: &str,
        node_type: NodeType,
        content: &Content,
    ) -> Result<Vec<String>> {
        let lookup = self.dependency_lookup(node_type, content).await?;
        let deps = dependency::deep_dependencies(node_type, content, &lookup)?;
        dependency::check_acyclic(id, &deps)?;
        Ok(deps)
    }

    /// Reject a content change that removes ports other live models still wire to.
    async fn check_ports(&self, model: &Node, before: &Content, after: &Content) -> Result<()> {
        if !model.node_type.is_model() {
            return Ok(());
        }
        let removed = dependency::removed_ports(before, after);
        if removed.is_empty() {
            return Ok(());
        }
        let dependents = self.store.find_dependents(&[model.id.clone()]).await?;
        let usages: Vec<_> = dependents
            .iter()
            .filter(|d| d.id != model.id && !d.is_trashed() && d.node_type.is_model())
            .flat_map(|d| dependency::dangling_port_usages(&model.id, &removed, d))
            .collect();
        if let Some(first) = usages.first() {
            return Err(HubError::DanglingReference(format!(
                "port {} of {} is still connected by process {} in {} ({} connection(s) total)",
                first.port,
                model.id,
                first.process_id,
                first.node_id,
                usages.len()
            )));
        }
        Ok(())
    }

    /// Validate replacement content for `live` and return its dependency list.
    async fn prepare_content(&self, live: &Node, content: &Content) -> Result<Vec<String>> {
        validator::validate_content(live.node_type, content)?;
        self.check_ports(live, &live.content, content).await?;
        self.compute_dependencies(&live.id, live.node_type, content).await
    }

    fn check_version(node: &Node, expected: ExpectedVersion) -> Result<()> {
        match expected {
            ExpectedVersion::Exact(v) if v != node.version => Err(HubError::VersionConflict {
                id: node.id.clone(),
                expected: v,
                actual: node.version,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"root_owner": "ops", "prune_window_secs": 60}"#)
            .unwrap();
        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.root_owner, "ops");
        assert_eq!(config.prune_window(), Duration::minutes(1));
        assert_eq!(config.copy_suffix, " - copy");
        assert_eq!(config.root_access, AccessControl::PublicReadWrite);
    }

    #[test]
    fn config_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        assert!(ServiceConfig::load(file.path()).is_err());
    }

    #[test]
    fn historical_ids_are_not_live_targets() {
        let id = "a".repeat(32);
        assert_eq!(NodeService::live_id(&id).unwrap(), id);
        assert!(matches!(
            NodeService::live_id(&format!("{id}@r1")),
            Err(HubError::BadRequest(_))
        ));
    }
}
