//! Principal directory: group membership and display names.
//!
//! Membership feeds permission resolution; names are response enrichment only.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::PrincipalType;

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn group_ids_for_user(&self, user_id: &str) -> Result<Vec<String>>;

    /// Whether an ACL entry of this type may name `id`. `ALL` always exists.
    async fn principal_exists(&self, principal_type: PrincipalType, id: &str) -> Result<bool>;

    async fn display_name(&self, user_id: &str) -> Result<Option<String>>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Seed file shape: `{"users": [...], "groups": [...]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
}

/// Static directory built from a seed.
///
/// With `open` set, unknown user ids are accepted as principals, which suits
/// deployments where users come straight from an external identity provider.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
    users: HashMap<String, UserRecord>,
    groups: HashMap<String, GroupRecord>,
    open: bool,
}

impl MemoryDirectory {
    pub fn new(seed: DirectorySeed) -> Self {
        let mut groups: HashMap<String, GroupRecord> = seed
            .groups
            .into_iter()
            .map(|g| (g.id.clone(), g))
            .collect();
        for user in &seed.users {
            for gid in &user.groups {
                groups.entry(gid.clone()).or_insert_with(|| GroupRecord {
                    id: gid.clone(),
                    name: None,
                });
            }
        }
        let users = seed.users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users,
            groups,
            open: false,
        }
    }

    /// Directory that knows nobody yet but accepts any user id.
    pub fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let seed: DirectorySeed = serde_json::from_str(raw).context("parsing principal seed")?;
        Ok(Self::new(seed))
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading principals from {}", path.display()))?;
        Self::from_json(&raw)
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryDirectory {
    async fn group_ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .users
            .get(user_id)
            .map(|u| u.groups.clone())
            .unwrap_or_default())
    }

    async fn principal_exists(&self, principal_type: PrincipalType, id: &str) -> Result<bool> {
        Ok(match principal_type {
            PrincipalType::All => true,
            PrincipalType::User => self.open || self.users.contains_key(id),
            PrincipalType::Group => self.groups.contains_key(id),
        })
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.users.get(user_id).and_then(|u| u.name.clone()))
    }
}
