use serde::{Deserialize, Serialize};
use tracing::info;

use super::NodeService;
use crate::access;
use crate::combined_id;
use crate::error::{HubError, Result};
use crate::events::NodeEvent;
use crate::node::{new_node_id, AccessControl, AccessGrant, AppUser, Content, Node, NodeType, Permission};
use crate::storage::Projection;
use crate::validator;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateNode {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub parent_id: String,
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub access_control: Option<AccessControl>,
    #[serde(default)]
    pub acl: Vec<AccessGrant>,
}

impl CreateNode {
    pub fn new(name: impl Into<String>, node_type: NodeType, parent_id: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            node_type,
            parent_id: parent_id.into(),
            content: Content::new(),
            access_control: None,
            acl: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    pub fn with_access(mut self, mode: AccessControl, acl: Vec<AccessGrant>) -> Self {
        self.access_control = Some(mode);
        self.acl = acl;
        self
    }
}

impl NodeService {
    pub async fn create(&self, user: &AppUser, req: CreateNode) -> Result<Node> {
        let groups = self.group_ids(user).await?;
        validator::validate_name(&req.name)?;
        if req.parent_id.trim().is_empty() {
            return Err(HubError::BadRequest("parentId is required".into()));
        }
        let parent_id = Self::live_id(&req.parent_id)?;
        let parent = self.live(&parent_id, Projection::Sparse).await?;

        // META attached to a simulation result skips the CREATE check.
        let exempt = req.node_type == NodeType::Meta && parent.node_type == NodeType::SimulationResult;
        if !exempt {
            self.authorize(user, &parent, &groups, Permission::Create).await?;
        }
        Self::ensure_live(&parent)?;

        let mode = req.access_control.unwrap_or_default();
        let acl = if mode == AccessControl::Advanced { req.acl } else { Vec::new() };
        let ancestors = parent.child_ancestors();
        access::validate_access_control(mode, &acl, &ancestors)?;
        self.check_principals(&acl).await?;
        validator::validate_content(req.node_type, &req.content)?;

        let id = match req.id {
            Some(id) => {
                if !combined_id::is_valid_base_id(&id) {
                    return Err(HubError::MalformedId(id));
                }
                if self.store.get(&id, Projection::Sparse).await?.is_some() {
                    return Err(HubError::DocumentExists(format!("id {id} is taken")));
                }
                id
            }
            None => new_node_id(),
        };
        let name = self.unique_name(&parent, &req.name).await?;
        let deps = self
            .compute_dependencies(&id, req.node_type, &req.content)
            .await?;

        let mut node = Node::new(id, name, req.node_type, user.id.clone(), &parent);
        node.content = req.content;
        node.access_control = mode;
        node.acl = acl;
        node.process_dependencies = deps;
        self.store.insert(node.clone()).await?;

        info!(id = %node.id, parent = %parent.id, node_type = node.node_type.as_str(), "created node");
        self.events.send(NodeEvent::Created {
            id: node.id.clone(),
            parent: parent.id,
        });
        Ok(node)
    }
}
