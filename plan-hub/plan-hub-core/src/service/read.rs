use serde::{Deserialize, Serialize};

use super::NodeService;
use crate::access;
use crate::combined_id::{CombinedId, IdKind};
use crate::error::{HubError, Result};
use crate::node::{AppUser, Channel, Node, Permission, PermissionSet, Snapshot};
use crate::storage::Projection;
use crate::trash;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GetOptions {
    /// Whether the caller is looking at the trash.
    pub trashed: bool,
    /// Include direct children the caller may read.
    pub children: bool,
}

/// A node as returned to a caller.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    pub permissions: PermissionSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
}

impl NodeService {
    /// Read a live node, or a version/release of one, by combined id.
    pub async fn get(&self, user: &AppUser, id: &str, options: GetOptions) -> Result<NodeView> {
        let groups = self.group_ids(user).await?;
        let cid = CombinedId::parse(id)?;
        let live = self.live(&cid.base_id, Projection::Full).await?;
        let (perms, chain) = self.resolve(user, &live, &groups).await?;
        if !perms.contains(Permission::Read) {
            return Err(HubError::not_found(format!("node {id}")));
        }
        trash::ensure_state(&live, options.trashed)?;

        let children = if options.children && cid.is_node() {
            Some(
                self.readable_children(user, &live, chain, &groups, options.trashed)
                    .await?,
            )
        } else {
            None
        };
        let node = match (cid.kind, cid.number) {
            (IdKind::Node, _) => live,
            (kind, Some(number)) => self.historical(&live, &cid, kind, number).await?,
            (_, None) => return Err(HubError::MalformedId(id.to_string())),
        };
        let owner_name = self.directory.display_name(&node.owner_id).await?;
        Ok(NodeView {
            node,
            permissions: perms,
            owner_name,
            children,
        })
    }

    async fn historical(&self, live: &Node, cid: &CombinedId, kind: IdKind, number: u64) -> Result<Node> {
        let snapshot = match kind {
            IdKind::Release => self.log.find_release(&live.id, number).await?,
            _ => match self.log.find_version(&live.id, number).await? {
                // the current version is never in the log until the next update
                None if number == live.version => {
                    Some(Snapshot::capture(live, Channel::Version, &live.last_modified_by, None))
                }
                found => found,
            },
        };
        snapshot
            .map(|s| s.to_node(live.trashed))
            .ok_or_else(|| HubError::not_found(cid.to_string()))
    }

    async fn readable_children(
        &self,
        user: &AppUser,
        parent: &Node,
        mut chain: Vec<Node>,
        groups: &[String],
        trashed: bool,
    ) -> Result<Vec<Node>> {
        let children = self
            .store
            .get_children(&parent.id, parent.depth(), Projection::Sparse, false)
            .await?;
        chain.push(parent.clone().sparse());
        let mut out = Vec::new();
        for child in trash::filter_trashed(children, trashed) {
            if access::has_read(user, &child, &chain, groups)? {
                out.push(child);
            }
        }
        Ok(out)
    }
}
