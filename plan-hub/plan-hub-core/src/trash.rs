//! Soft-delete state transitions. The service applies these to every node of a
//! cascade; this module only knows about one node at a time.

use chrono::{DateTime, Utc};

use crate::error::{HubError, Result};
use crate::node::Node;

pub fn trash(node: &mut Node, now: DateTime<Utc>) -> Result<()> {
    if node.is_trashed() {
        return Err(HubError::TrashState(format!("node {} is already trashed", node.id)));
    }
    node.trashed = Some(true);
    node.trashed_at = Some(now);
    Ok(())
}

pub fn restore(node: &mut Node) -> Result<()> {
    if !node.is_trashed() {
        return Err(HubError::TrashState(format!("node {} is not trashed", node.id)));
    }
    node.trashed = Some(false);
    node.trashed_at = None;
    Ok(())
}

/// Keep nodes whose trashed flag equals `want_trashed`; a missing flag counts as live.
pub fn filter_trashed(nodes: Vec<Node>, want_trashed: bool) -> Vec<Node> {
    nodes
        .into_iter()
        .filter(|n| n.is_trashed() == want_trashed)
        .collect()
}

/// Descendants trashed by the same cascade as `node`.
pub fn cascade_members<'a>(node: &Node, descendants: &'a [Node]) -> Vec<&'a Node> {
    descendants
        .iter()
        .filter(|d| d.is_trashed() && d.trashed_at == node.trashed_at)
        .collect()
}

/// Error unless `live` is trashed exactly when the caller asked for trashed nodes.
pub fn ensure_state(node: &Node, want_trashed: bool) -> Result<()> {
    match (node.is_trashed(), want_trashed) {
        (true, false) => Err(HubError::TrashState(format!("node {} is in the trash", node.id))),
        (false, true) => Err(HubError::TrashState(format!("node {} is not in the trash", node.id))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{new_node_id, AccessControl, NodeType};
    use chrono::Duration;

    fn node() -> Node {
        let root = Node::root("admin", AccessControl::PublicReadWrite);
        Node::new(new_node_id(), "n".into(), NodeType::Folder, "u".into(), &root)
    }

    #[test]
    fn trash_then_restore_keeps_version_and_content() {
        let mut n = node();
        n.version = 4;
        n.content.insert("k".into(), serde_json::json!(1));
        let before = n.clone();
        trash(&mut n, Utc::now()).unwrap();
        assert!(n.is_trashed());
        restore(&mut n).unwrap();
        assert!(!n.is_trashed());
        assert_eq!(n.version, before.version);
        assert_eq!(n.content, before.content);
    }

    #[test]
    fn restore_requires_trashed() {
        let mut n = node();
        assert!(matches!(restore(&mut n), Err(HubError::TrashState(_))));
        n.trashed = Some(false);
        assert!(restore(&mut n).is_err());
    }

    #[test]
    fn double_trash_rejected() {
        let mut n = node();
        trash(&mut n, Utc::now()).unwrap();
        assert!(trash(&mut n, Utc::now()).is_err());
    }

    #[test]
    fn filter_treats_null_as_live() {
        let live = node();
        let mut gone = node();
        trash(&mut gone, Utc::now()).unwrap();
        let nodes = vec![live.clone(), gone.clone()];
        assert_eq!(filter_trashed(nodes.clone(), false), vec![live]);
        assert_eq!(filter_trashed(nodes, true), vec![gone]);
    }

    #[test]
    fn cascade_members_share_the_stamp() {
        let now = Utc::now();
        let mut parent = node();
        trash(&mut parent, now).unwrap();
        let mut same = node();
        trash(&mut same, now).unwrap();
        let mut earlier = node();
        trash(&mut earlier, now - Duration::minutes(3)).unwrap();
        let live = node();
        let descendants = vec![same.clone(), earlier, live];
        let members = cascade_members(&parent, &descendants);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, same.id);
    }
}
