//! Effective-permission resolution.
//!
//! Resolution is a pure function of the user, the node, the node's fetched
//! ancestor chain and the user's group ids. Owners always get every
//! permission; otherwise the node's access-control mode decides, walking up to
//! the nearest non-inheriting ancestor for `INHERIT`.

use std::collections::HashMap;

use crate::error::{HubError, Result};
use crate::node::{AccessControl, AccessGrant, AppUser, Node, Permission, PermissionSet, PrincipalType};


/// Permissions `user` holds on `node`.
///
/// `chain` holds the node's ancestors as fetched from the store; order does
/// not matter, lookups go through `node.ancestors`.
pub fn permissions(
    user: &AppUser,
    node: &Node,
    chain: &[Node],
    group_ids: &[String],
) -> Result<PermissionSet> {
    if user.id.trim().is_empty() {
        return Err(HubError::not_found("user"));
    }
    if node.owner_id == user.id {
        return Ok(PermissionSet::all());
    }
    match node.access_control {
        AccessControl::PublicReadWrite => Ok(PermissionSet::all()),
        AccessControl::PublicReadOnly => Ok(PermissionSet::read_only()),
        AccessControl::Advanced => Ok(granted(user, &node.acl, group_ids)),
        AccessControl::Private => Ok(PermissionSet::empty()),
        AccessControl::Inherit => {
            let source = inheritance_source(node, chain)?;
            permissions(user, source, &[], group_ids)
        }
    }
}

/// The ancestor whose own mode decides for an `INHERIT` node.
pub fn inheritance_source<'a>(node: &Node, chain: &'a [Node]) -> Result<&'a Node> {
    if node.ancestors.is_empty() {
        return Err(HubError::InvalidAccessControl(format!(
            "node {} inherits access but has no ancestors",
            node.id
        )));
    }
    let by_id: HashMap<&str, &Node> = chain.iter().map(|n| (n.id.as_str(), n)).collect();
    node.ancestors
        .iter()
        .rev()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .find(|ancestor| ancestor.access_control != AccessControl::Inherit)
        .ok_or_else(|| {
            HubError::not_found(format!("no access-control source above node {}", node.id))
        })
}

fn granted(user: &AppUser, acl: &[AccessGrant], group_ids: &[String]) -> PermissionSet {
    acl.iter()
        .filter(|grant| match grant.principal_type {
            PrincipalType::All => true,
            PrincipalType::User => grant.principal() == Some(user.id.as_str()),
            PrincipalType::Group => grant
                .principal()
                .is_some_and(|gid| group_ids.iter().any(|g| g == gid)),
        })
        .fold(PermissionSet::empty(), |acc, grant| acc.union(grant.permissions))
}

/// Single-permission check with the public-mode shortcut.
pub fn has_permission(
    user: &AppUser,
    node: &Node,
    chain: &[Node],
    group_ids: &[String],
    permission: Permission,
) -> Result<bool> {
    if user.id.trim().is_empty() {
        return Err(HubError::not_found("user"));
    }
    match node.access_control {
        AccessControl::PublicReadWrite => return Ok(true),
        AccessControl::PublicReadOnly if permission == Permission::Read => return Ok(true),
        _ => {}
    }
    Ok(permissions(user, node, chain, group_ids)?.contains(permission))
}

pub fn has_read(user: &AppUser, node: &Node, chain: &[Node], group_ids: &[String]) -> Result<bool> {
    has_permission(user, node, chain, group_ids, Permission::Read)
}

pub fn has_create(user: &AppUser, node: &Node, chain: &[Node], group_ids: &[String]) -> Result<bool> {
    has_permission(user, node, chain, group_ids, Permission::Create)
}

pub fn has_modify(user: &AppUser, node: &Node, chain: &[Node], group_ids: &[String]) -> Result<bool> {
    has_permission(user, node, chain, group_ids, Permission::Modify)
}

pub fn has_delete(user: &AppUser, node: &Node, chain: &[Node], group_ids: &[String]) -> Result<bool> {
    has_permission(user, node, chain, group_ids, Permission::Delete)
}

/// Write-time check of the access-control invariants.
pub fn validate_access_control(
    mode: AccessControl,
    acl: &[AccessGrant],
    ancestors: &[String],
) -> Result<()> {
    match mode {
        AccessControl::Advanced if acl.is_empty() => {
            return Err(HubError::InvalidAccessControl(
                "ADVANCED access control needs at least one grant".into(),
            ))
        }
        AccessControl::Inherit if ancestors.is_empty() => {
            return Err(HubError::InvalidAccessControl(
                "the root cannot inherit access control".into(),
            ))
        }
        _ => {}
    }
    for grant in acl {
        if grant.principal_type != PrincipalType::All && grant.principal().is_none() {
            return Err(HubError::InvalidAccessControl(format!(
                "{:?} grant is missing a principal id",
                grant.principal_type
            )));
        }
    }
    Ok(())
}
