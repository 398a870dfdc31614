use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{info, warn};

use super::NodeService;
use crate::access;
use crate::error::{HubError, Result};
use crate::events::NodeEvent;
use crate::node::{AppUser, Node, Permission, ROOT_ID};
use crate::storage::Projection;
use crate::trash;

impl NodeService {
    /// Trash `id` and its live descendants, or with `remove` delete the
    /// subtree and its history outright. Returns how many nodes changed.
    pub async fn delete(&self, user: &AppUser, id: &str, remove: bool) -> Result<usize> {
        let groups = self.group_ids(user).await?;
        let id = Self::live_id(id)?;
        let node = self.live(&id, Projection::Sparse).await?;
        if node.is_root() {
            return Err(HubError::BadRequest("the root cannot be deleted".into()));
        }
        self.authorize(user, &node, &groups, Permission::Delete).await?;
        let descendants = self.store.descendants(&node, Projection::Sparse).await?;
        if remove {
            self.remove_subtree(&node, &descendants).await
        } else {
            self.trash_subtree(node, &descendants).await
        }
    }

    async fn trash_subtree(&self, node: Node, descendants: &[Node]) -> Result<usize> {
        let now = Utc::now();
        let mut staged = node.clone();
        trash::trash(&mut staged, now)?;
        self.store.set_trashed(&node.id, true, Some(now)).await?;

        let mut count = 1;
        // already-trashed descendants keep their own stamp
        for d in descendants.iter().filter(|d| !d.is_trashed()) {
            if let Err(err) = self.store.set_trashed(&d.id, true, Some(now)).await {
                warn!(root = %node.id, failed = %d.id, error = %err, "trash cascade aborted");
                return Err(HubError::CascadeFailed {
                    node_id: d.id.clone(),
                    reason: err.public_reason(),
                });
            }
            count += 1;
        }
        info!(id = %node.id, count, "trashed subtree");
        self.events.send(NodeEvent::Trashed {
            id: node.id,
            cascade: count - 1,
        });
        Ok(count)
    }

    async fn remove_subtree(&self, node: &Node, descendants: &[Node]) -> Result<usize> {
        let ids: Vec<String> = std::iter::once(node.id.clone())
            .chain(descendants.iter().map(|d| d.id.clone()))
            .collect();
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let pinned = self.log.find_releases_depending_on(&ids).await?;
        if let Some(release) = pinned
            .iter()
            .find(|r| !doomed.contains(r.base_node_id.as_str()))
        {
            return Err(HubError::FailedDependency(format!(
                "release {} depends on the subtree of {}",
                release.combined_id(),
                node.id
            )));
        }
        let dependents = self.store.find_dependents(&ids).await?;
        if let Some(dependent) = dependents.iter().find(|d| {
            !doomed.contains(d.id.as_str()) && !d.is_trashed() && d.node_type.is_model()
        }) {
            return Err(HubError::FailedDependency(format!(
                "model {} depends on the subtree of {}",
                dependent.id, node.id
            )));
        }

        let removed = self.store.delete_many(&ids).await?;
        let purged = self.log.purge(&ids).await?;
        info!(id = %node.id, removed, purged, "removed subtree");
        self.events.send(NodeEvent::Deleted {
            id: node.id.clone(),
            removed,
        });
        Ok(removed)
    }

    /// Bring `id` back from the trash together with the descendants its
    /// trashing took along.
    pub async fn restore_from_trash(&self, user: &AppUser, id: &str) -> Result<Node> {
        let groups = self.group_ids(user).await?;
        let id = Self::live_id(id)?;
        let node = self.live(&id, Projection::Sparse).await?;
        self.authorize(user, &node, &groups, Permission::Delete).await?;
        let mut staged = node.clone();
        trash::restore(&mut staged)?;

        if let Some(parent_id) = node.parent_id() {
            let parent = self.live(parent_id, Projection::Sparse).await?;
            if parent.is_trashed() {
                return Err(HubError::TrashState(format!(
                    "parent {parent_id} of {} is in the trash",
                    node.id
                )));
            }
            if self.name_taken(&parent, &node.name, Some(&node.id)).await? {
                return Err(HubError::DocumentExists(format!(
                    "{} already exists under {parent_id}",
                    node.name
                )));
            }
        }

        let descendants = self.store.descendants(&node, Projection::Sparse).await?;
        let members: Vec<String> = trash::cascade_members(&node, &descendants)
            .into_iter()
            .map(|d| d.id.clone())
            .collect();
        let restored = self.store.set_trashed(&node.id, false, None).await?;
        for member in &members {
            if let Err(err) = self.store.set_trashed(member, false, None).await {
                warn!(root = %node.id, failed = %member, error = %err, "restore cascade aborted");
                return Err(HubError::CascadeFailed {
                    node_id: member.clone(),
                    reason: err.public_reason(),
                });
            }
        }
        info!(id = %node.id, cascade = members.len(), "restored from trash");
        self.events.send(NodeEvent::Restored {
            id: node.id.clone(),
            cascade: members.len(),
        });
        Ok(restored)
    }

    /// Trashed subtrees the caller can read, one entry per trash operation.
    pub async fn list_trash(&self, user: &AppUser) -> Result<Vec<Node>> {
        let groups = self.group_ids(user).await?;
        let trashed = self.store.list_trashed(ROOT_ID).await?;
        let stamps: HashMap<&str, _> = trashed
            .iter()
            .map(|n| (n.id.as_str(), n.trashed_at))
            .collect();

        let mut ancestor_ids: Vec<String> = trashed
            .iter()
            .flat_map(|n| n.ancestors.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ancestor_ids.sort();
        let chain = self.store.get_many(&ancestor_ids, Projection::Sparse).await?;

        let mut out = Vec::new();
        for node in &trashed {
            let swept_along = node
                .parent_id()
                .and_then(|p| stamps.get(p))
                .is_some_and(|stamp| *stamp == node.trashed_at);
            if !swept_along && access::has_read(user, node, &chain, &groups)? {
                out.push(node.clone());
            }
        }
        Ok(out)
    }
}
