use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::NodeService;
use crate::access;
use crate::error::{HubError, Result};
use crate::events::NodeEvent;
use crate::node::{AccessControl, AccessGrant, AppUser, Channel, Content, Node, Permission, Snapshot};
use crate::patch::{self, Patch};
use crate::storage::{ExpectedVersion, NodeChanges, Projection};
use crate::validator;

/// Field edits for [`NodeService::update`]. Absent fields stay as they are.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNode {
    pub version_number: ExpectedVersion,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub access_control: Option<AccessControl>,
    #[serde(default)]
    pub acl: Option<Vec<AccessGrant>>,
    /// Accepted only when it names the current parent.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Attached to the version snapshot of the pre-image.
    #[serde(default)]
    pub comment: Option<String>,
}

impl UpdateNode {
    pub fn at(version_number: ExpectedVersion) -> Self {
        Self {
            version_number,
            name: None,
            content: None,
            access_control: None,
            acl: None,
            parent_id: None,
            comment: None,
        }
    }
}

impl NodeService {
    /// Load `id` for writing: caller needs MODIFY and the node must be live.
    pub(super) async fn writable(&self, user: &AppUser, id: &str) -> Result<Node> {
        let groups = self.group_ids(user).await?;
        let id = Self::live_id(id)?;
        let live = self.live(&id, Projection::Full).await?;
        self.authorize(user, &live, &groups, Permission::Modify).await?;
        Self::ensure_live(&live)?;
        Ok(live)
    }

    /// Snapshot the pre-image, then apply `changes` guarded by `expected`.
    pub(super) async fn commit(
        &self,
        user: &AppUser,
        live: &Node,
        expected: ExpectedVersion,
        mut changes: NodeChanges,
        comment: Option<String>,
    ) -> Result<Node> {
        changes.modified_by = Some(user.id.clone());
        let snapshot = Snapshot::capture(live, Channel::Version, &user.id, comment);
        if let Some(pruned) = self
            .log
            .insert_version(snapshot, self.config.prune_window())
            .await?
        {
            debug!(id = %live.id, pruned, "collapsed version history");
        }
        let updated = self
            .store
            .conditional_update(&live.id, expected, changes)
            .await?;
        self.events.send(NodeEvent::Updated {
            id: updated.id.clone(),
            version: updated.version,
        });
        Ok(updated)
    }

    pub async fn update(&self, user: &AppUser, id: &str, req: UpdateNode) -> Result<Node> {
        let live = self.writable(user, id).await?;
        if let Some(parent_id) = req.parent_id.as_deref() {
            if Some(parent_id) != live.parent_id() {
                return Err(HubError::BadRequest(
                    "parentId cannot change on update, move the node instead".into(),
                ));
            }
        }
        Self::check_version(&live, req.version_number)?;

        let mut changes = NodeChanges::default();
        let mut renamed = None;
        if let Some(name) = req.name.filter(|n| *n != live.name) {
            validator::validate_name(&name)?;
            if let Some(parent_id) = live.parent_id() {
                let parent = self.live(parent_id, Projection::Sparse).await?;
                if self.name_taken(&parent, &name, Some(&live.id)).await? {
                    return Err(HubError::DocumentExists(format!(
                        "{name} already exists under {parent_id}"
                    )));
                }
            }
            renamed = Some(name.clone());
            changes.name = Some(name);
        }

        if req.access_control.is_some() || req.acl.is_some() {
            if live.owner_id != user.id {
                debug!(id = %live.id, user = %user.id, "ignoring access change from non-owner");
            } else {
                let mode = req.access_control.unwrap_or(live.access_control);
                let acl = match mode {
                    AccessControl::Advanced => req.acl.unwrap_or_else(|| live.acl.clone()),
                    _ => Vec::new(),
                };
                access::validate_access_control(mode, &acl, &live.ancestors)?;
                self.check_principals(&acl).await?;
                changes.access_control = Some(mode);
                changes.acl = Some(acl);
            }
        }

        if let Some(content) = req.content {
            let deps = self.prepare_content(&live, &content).await?;
            changes.content = Some(content);
            changes.process_dependencies = Some(deps);
        }

        if changes.is_empty() {
            return Ok(live);
        }
        let updated = self
            .commit(user, &live, req.version_number, changes, req.comment)
            .await?;
        if let Some(name) = renamed {
            let touched = self.log.rename_releases(&updated.id, &name).await?;
            debug!(id = %updated.id, touched, "renamed releases");
        }
        info!(id = %updated.id, version = updated.version, "updated node");
        Ok(updated)
    }

    /// Apply a structural patch to the content of `id`.
    pub async fn patch_content(
        &self,
        user: &AppUser,
        id: &str,
        expected: ExpectedVersion,
        patch: &Patch,
    ) -> Result<Node> {
        let live = self.writable(user, id).await?;
        Self::check_version(&live, expected)?;
        if patch.is_empty() {
            return Ok(live);
        }
        // ports are diffed against the untouched live content
        let content = patch::applied(&live.content, patch)?;
        let deps = self.prepare_content(&live, &content).await?;
        let changes = NodeChanges {
            content: Some(content),
            process_dependencies: Some(deps),
            ..NodeChanges::default()
        };
        let updated = self.commit(user, &live, expected, changes, None).await?;
        info!(id = %updated.id, version = updated.version, "patched content");
        Ok(updated)
    }
}
