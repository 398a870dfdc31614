//! Node, grant and snapshot shapes shared by the store, the log and the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::combined_id::{self, ID_LENGTH};

/// Id of the synthetic tree root. Every other node lists it first in `ancestors`.
pub const ROOT_ID: &str = "root";

/// Freeform per-type payload of a node.
pub type Content = Map<String, Value>;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Folder,
    Model,
    ModelTemplate,
    Simulation,
    SimulationResult,
    ForecastProject,
    ForecastSheet,
    ForecastVariableNumeric,
    ForecastVariableBreakdown,
    Meta,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Folder => "FOLDER",
            NodeType::Model => "MODEL",
            NodeType::ModelTemplate => "MODEL_TEMPLATE",
            NodeType::Simulation => "SIMULATION",
            NodeType::SimulationResult => "SIMULATION_RESULT",
            NodeType::ForecastProject => "FORECAST_PROJECT",
            NodeType::ForecastSheet => "FORECAST_SHEET",
            NodeType::ForecastVariableNumeric => "FORECAST_VARIABLE_NUMERIC",
            NodeType::ForecastVariableBreakdown => "FORECAST_VARIABLE_BREAKDOWN",
            NodeType::Meta => "META",
        }
    }

    /// Model-like nodes carry process graphs and ports.
    pub fn is_model(&self) -> bool {
        matches!(self, NodeType::Model | NodeType::ModelTemplate)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessControl {
    Private,
    PublicReadOnly,
    PublicReadWrite,
    Advanced,
    #[default]
    Inherit,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Read,
    Create,
    Modify,
    Delete,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::Read,
        Permission::Create,
        Permission::Modify,
        Permission::Delete,
    ];

    fn bit(self) -> u8 {
        match self {
            Permission::Read => 1,
            Permission::Create => 1 << 1,
            Permission::Modify => 1 << 2,
            Permission::Delete => 1 << 3,
        }
    }
}

/// Small set of permissions, serialized as a list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet(u8);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self::from_iter(Permission::ALL)
    }

    pub fn read_only() -> Self {
        Self(Permission::Read.bit())
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0 |= permission.bit();
    }

    pub fn union(self, other: PermissionSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = PermissionSet::empty();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Permission>::deserialize(deserializer)?;
        Ok(list.into_iter().collect())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    All,
    User,
    Group,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub principal_type: PrincipalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    pub permissions: PermissionSet,
}

impl AccessGrant {
    pub fn everyone(permissions: PermissionSet) -> Self {
        Self {
            principal_type: PrincipalType::All,
            principal_id: None,
            permissions,
        }
    }

    pub fn user(id: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            principal_type: PrincipalType::User,
            principal_id: Some(id.into()),
            permissions,
        }
    }

    pub fn group(id: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            principal_type: PrincipalType::Group,
            principal_id: Some(id.into()),
            permissions,
        }
    }

    /// Principal id with surrounding whitespace ignored; `None` when blank.
    pub fn principal(&self) -> Option<&str> {
        self.principal_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Authenticated principal supplied by the caller on every operation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppUser {
    pub id: String,
    #[serde(default)]
    pub role: Role,
}

impl AppUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
        }
    }
}

/// The live, mutable document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub ancestors: Vec<String>,
    pub owner_id: String,
    #[serde(default)]
    pub access_control: AccessControl,
    #[serde(default)]
    pub acl: Vec<AccessGrant>,
    #[serde(default)]
    pub trashed: Option<bool>,
    #[serde(default)]
    pub trashed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub process_dependencies: Vec<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: String,
}

impl Node {
    /// A fresh node at version 0 placed under `parent`.
    pub fn new(
        id: String,
        name: String,
        node_type: NodeType,
        owner_id: String,
        parent: &Node,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            node_type,
            content: Content::new(),
            ancestors: parent.child_ancestors(),
            last_modified_by: owner_id.clone(),
            owner_id,
            access_control: AccessControl::Inherit,
            acl: Vec::new(),
            trashed: None,
            trashed_at: None,
            process_dependencies: Vec::new(),
            version: 0,
            created_at: now,
            last_modified_at: now,
        }
    }

    /// The synthetic root folder.
    pub fn root(owner_id: impl Into<String>, access_control: AccessControl) -> Self {
        let owner_id = owner_id.into();
        let now = Utc::now();
        Self {
            id: ROOT_ID.to_string(),
            name: ROOT_ID.to_string(),
            node_type: NodeType::Folder,
            content: Content::new(),
            ancestors: Vec::new(),
            last_modified_by: owner_id.clone(),
            owner_id,
            access_control,
            acl: Vec::new(),
            trashed: None,
            trashed_at: None,
            process_dependencies: Vec::new(),
            version: 0,
            created_at: now,
            last_modified_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed.unwrap_or(false)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.ancestors.last().map(String::as_str)
    }

    /// Depth of this node, i.e. the index its id occupies in a descendant's `ancestors`.
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Ancestor chain a direct child of this node carries.
    pub fn child_ancestors(&self) -> Vec<String> {
        let mut chain = self.ancestors.clone();
        chain.push(self.id.clone());
        chain
    }

    /// Metadata-only view used for sparse projections.
    pub fn sparse(mut self) -> Self {
        self.content = Content::new();
        self
    }
}

/// Generate a fresh base id of the fixed combined-id length.
pub fn new_node_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    debug_assert_eq!(id.len(), ID_LENGTH);
    id
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Version,
    Release,
}

/// Immutable historical copy of a node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub channel: Channel,
    pub base_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_number: Option<u64>,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub content: Content,
    pub ancestors: Vec<String>,
    pub owner_id: String,
    pub access_control: AccessControl,
    pub acl: Vec<AccessGrant>,
    pub process_dependencies: Vec<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: String,
    pub captured_at: DateTime<Utc>,
    pub captured_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Snapshot {
    /// Capture `node` into the given channel. Release numbers are assigned by the log.
    pub fn capture(node: &Node, channel: Channel, captured_by: &str, comment: Option<String>) -> Self {
        Self {
            channel,
            base_node_id: node.id.clone(),
            release_number: None,
            name: node.name.clone(),
            node_type: node.node_type,
            content: node.content.clone(),
            ancestors: node.ancestors.clone(),
            owner_id: node.owner_id.clone(),
            access_control: node.access_control,
            acl: node.acl.clone(),
            process_dependencies: node.process_dependencies.clone(),
            version: node.version,
            created_at: node.created_at,
            last_modified_at: node.last_modified_at,
            last_modified_by: node.last_modified_by.clone(),
            captured_at: Utc::now(),
            captured_by: captured_by.to_string(),
            comment: comment.filter(|c| !c.trim().is_empty()),
        }
    }

    /// Number addressing this entry within its channel.
    pub fn number(&self) -> u64 {
        match self.channel {
            Channel::Version => self.version,
            Channel::Release => self.release_number.unwrap_or(0),
        }
    }

    pub fn combined_id(&self) -> String {
        match self.channel {
            Channel::Version => combined_id::encode_version(&self.base_node_id, self.version),
            Channel::Release => combined_id::encode_release(&self.base_node_id, self.number()),
        }
    }

    pub fn has_comment(&self) -> bool {
        self.comment.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    /// Rehydrate into a read-only node view addressed by the combined id.
    pub fn to_node(&self, trashed: Option<bool>) -> Node {
        Node {
            id: self.combined_id(),
            name: self.name.clone(),
            node_type: self.node_type,
            content: self.content.clone(),
            ancestors: self.ancestors.clone(),
            owner_id: self.owner_id.clone(),
            access_control: self.access_control,
            acl: self.acl.clone(),
            trashed,
            trashed_at: None,
            process_dependencies: self.process_dependencies.clone(),
            version: self.version,
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
            last_modified_by: self.last_modified_by.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_set_serializes_as_list() {
        let set: PermissionSet = [Permission::Modify, Permission::Read].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["READ","MODIFY"]"#);
        let back: PermissionSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn child_ancestors_append_parent() {
        let root = Node::root("admin", AccessControl::PublicReadWrite);
        let folder = Node::new(new_node_id(), "F".into(), NodeType::Folder, "u1".into(), &root);
        assert_eq!(folder.ancestors, vec![ROOT_ID.to_string()]);
        assert_eq!(folder.parent_id(), Some(ROOT_ID));
        assert_eq!(folder.version, 0);
        assert_eq!(folder.child_ancestors(), vec![ROOT_ID.to_string(), folder.id.clone()]);
    }

    #[test]
    fn blank_principal_is_none() {
        let grant = AccessGrant::user("  ", PermissionSet::read_only());
        assert_eq!(grant.principal(), None);
    }

    #[test]
    fn snapshot_view_uses_combined_id() {
        let root = Node::root("admin", AccessControl::PublicReadWrite);
        let mut node = Node::new(new_node_id(), "M".into(), NodeType::Model, "u1".into(), &root);
        node.version = 3;
        let snap = Snapshot::capture(&node, Channel::Version, "u1", Some("  ".into()));
        assert!(!snap.has_comment());
        assert_eq!(snap.to_node(None).id, format!("{}@3", node.id));
    }
}
