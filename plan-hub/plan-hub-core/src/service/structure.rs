use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};

use super::NodeService;
use crate::access;
use crate::dependency;
use crate::error::{HubError, Result};
use crate::events::NodeEvent;
use crate::node::{new_node_id, AppUser, Node, Permission};
use crate::storage::{ExpectedVersion, NodeChanges, Projection};
use crate::trash;

/// Ancestors of `node` once the subtree rooted at depth `old_depth` hangs
/// below `new_prefix`.
fn rebased(node: &Node, old_depth: usize, new_prefix: &[String]) -> Vec<String> {
    let mut out = new_prefix.to_vec();
    out.extend(node.ancestors.iter().skip(old_depth).cloned());
    out
}

fn inside(candidate: &Node, subtree_root: &Node) -> bool {
    candidate.id == subtree_root.id || candidate.ancestors.contains(&subtree_root.id)
}

impl NodeService {
    /// Re-parent `id` under `new_parent_id`, rewriting every descendant's ancestors.
    pub async fn move_node(
        &self,
        user: &AppUser,
        id: &str,
        new_parent_id: &str,
        expected: ExpectedVersion,
    ) -> Result<Node> {
        let groups = self.group_ids(user).await?;
        let id = Self::live_id(id)?;
        let node = self.live(&id, Projection::Sparse).await?;
        if node.is_root() {
            return Err(HubError::BadRequest("the root cannot be moved".into()));
        }
        self.authorize(user, &node, &groups, Permission::Delete).await?;
        Self::ensure_live(&node)?;

        let dest = self.live(&Self::live_id(new_parent_id)?, Projection::Sparse).await?;
        self.authorize(user, &dest, &groups, Permission::Create).await?;
        Self::ensure_live(&dest)?;
        if inside(&dest, &node) {
            return Err(HubError::BadRequest(format!(
                "cannot move {} into its own subtree",
                node.id
            )));
        }
        Self::check_version(&node, expected)?;
        if node.parent_id() == Some(dest.id.as_str()) {
            return Ok(node);
        }
        if self.name_taken(&dest, &node.name, Some(&node.id)).await? {
            return Err(HubError::DocumentExists(format!(
                "{} already exists under {}",
                node.name, dest.id
            )));
        }

        // fetched before the first write so the rewrite covers exactly this subtree
        let descendants = self.store.descendants(&node, Projection::Sparse).await?;
        let prefix = dest.child_ancestors();
        let moved = self
            .store
            .conditional_update(
                &node.id,
                expected,
                NodeChanges {
                    ancestors: Some(prefix.clone()),
                    modified_by: Some(user.id.clone()),
                    ..NodeChanges::default()
                },
            )
            .await?;

        for d in &descendants {
            let changes = NodeChanges {
                ancestors: Some(rebased(d, node.depth(), &prefix)),
                modified_by: Some(user.id.clone()),
                ..NodeChanges::default()
            };
            if let Err(err) = self
                .store
                .conditional_update(&d.id, ExpectedVersion::Exact(d.version), changes)
                .await
            {
                warn!(root = %node.id, failed = %d.id, error = %err, "move cascade aborted");
                return Err(HubError::MoveFailed {
                    node_id: d.id.clone(),
                    reason: err.public_reason(),
                });
            }
        }

        info!(id = %node.id, to = %dest.id, descendants = descendants.len(), "moved node");
        self.events.send(NodeEvent::Moved {
            id: node.id.clone(),
            new_parent: dest.id,
        });
        Ok(moved)
    }

    /// Duplicate `id` and its readable live subtree under `dest_parent_id`,
    /// including release history. Returns the new top node.
    pub async fn copy(&self, user: &AppUser, id: &str, dest_parent_id: &str) -> Result<Node> {
        let groups = self.group_ids(user).await?;
        let id = Self::live_id(id)?;
        let source = self.live(&id, Projection::Full).await?;
        if source.is_root() {
            return Err(HubError::BadRequest("the root cannot be copied".into()));
        }
        let mut chain = self
            .authorize(user, &source, &groups, Permission::Read)
            .await?;
        Self::ensure_live(&source)?;

        let dest = self
            .live(&Self::live_id(dest_parent_id)?, Projection::Sparse)
            .await?;
        self.authorize(user, &dest, &groups, Permission::Create).await?;
        Self::ensure_live(&dest)?;
        if inside(&dest, &source) {
            return Err(HubError::BadRequest(format!(
                "cannot copy {} into its own subtree",
                source.id
            )));
        }

        let descendants = trash::filter_trashed(
            self.store.descendants(&source, Projection::Full).await?,
            false,
        );
        chain.push(source.clone());
        chain.extend(descendants.iter().cloned());

        // depth order guarantees a parent is mapped before its children
        let mut id_map: HashMap<String, String> = HashMap::new();
        id_map.insert(source.id.clone(), new_node_id());
        let mut members = vec![source.clone()];
        for d in descendants {
            let parent_copied = d.parent_id().is_some_and(|p| id_map.contains_key(p));
            if parent_copied && access::has_read(user, &d, &chain, &groups)? {
                id_map.insert(d.id.clone(), new_node_id());
                members.push(d);
            }
        }

        let top_name = format!("{}{}", source.name, self.config.copy_suffix);
        let top_name = self.unique_name(&dest, &top_name).await?;
        let prefix = dest.child_ancestors();
        let now = Utc::now();
        let mut top = None;
        for original in &members {
            let mut copy = original.clone();
            copy.id = id_map
                .get(&original.id)
                .cloned()
                .ok_or_else(|| HubError::not_found(original.id.clone()))?;
            copy.ancestors = rebased(original, source.depth(), &prefix)
                .into_iter()
                .map(|a| id_map.get(&a).cloned().unwrap_or(a))
                .collect();
            if original.id == source.id {
                copy.name = top_name.clone();
            }
            copy.owner_id = user.id.clone();
            copy.last_modified_by = user.id.clone();
            copy.version = 0;
            copy.trashed = None;
            copy.trashed_at = None;
            copy.created_at = now;
            copy.last_modified_at = now;
            dependency::update_dependencies(&mut copy.content, &mut copy.process_dependencies, &id_map);
            dependency::check_acyclic(&copy.id, &copy.process_dependencies)?;

            self.store
                .insert(copy.clone())
                .await
                .map_err(|err| cascade_failed(&original.id, err))?;
            self.copy_releases(original, &copy, &id_map).await?;
            if top.is_none() {
                top = Some(copy);
            }
        }

        let top = top.ok_or_else(|| HubError::not_found(source.id.clone()))?;
        info!(source = %source.id, copy = %top.id, nodes = members.len(), "copied subtree");
        self.events.send(NodeEvent::Copied {
            id: top.id.clone(),
            source: source.id,
        });
        Ok(top)
    }

    async fn copy_releases(
        &self,
        original: &Node,
        copy: &Node,
        id_map: &HashMap<String, String>,
    ) -> Result<()> {
        for mut release in self.log.find_releases(&original.id).await? {
            release.base_node_id = copy.id.clone();
            release.ancestors = copy.ancestors.clone();
            release.owner_id = copy.owner_id.clone();
            dependency::update_dependencies(&mut release.content, &mut release.process_dependencies, id_map);
            self.log
                .insert(release)
                .await
                .map_err(|err| cascade_failed(&original.id, err))?;
        }
        Ok(())
    }
}

fn cascade_failed(node_id: &str, err: HubError) -> HubError {
    warn!(node = %node_id, error = %err, "copy cascade aborted");
    HubError::CascadeFailed {
        node_id: node_id.to_string(),
        reason: err.public_reason(),
    }
}
