use super::*;
use crate::error::HubError;
use crate::node::{new_node_id, AccessControl, Node, NodeType};

fn model() -> Node {
    let root = Node::root("admin", AccessControl::PublicReadWrite);
    Node::new(new_node_id(), "M".into(), NodeType::Model, "u1".into(), &root)
}

fn at_version(node: &Node, version: u64, by: &str, minutes: i64) -> Snapshot {
    let mut n = node.clone();
    n.version = version;
    n.last_modified_by = by.to_string();
    n.last_modified_at = node.created_at + Duration::minutes(minutes);
    Snapshot::capture(&n, Channel::Version, by, None)
}

fn window() -> Duration {
    Duration::minutes(5)
}

#[tokio::test]
async fn quick_same_author_edits_collapse() {
    let log = MemorySnapshotLog::new();
    let node = model();
    assert_eq!(log.insert_version(at_version(&node, 0, "u1", 0), window()).await.unwrap(), None);
    assert_eq!(log.insert_version(at_version(&node, 1, "u1", 1), window()).await.unwrap(), None);
    assert_eq!(log.insert_version(at_version(&node, 2, "u1", 2), window()).await.unwrap(), Some(1));

    let versions: Vec<u64> = log
        .find_versions(&node.id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.version)
        .collect();
    assert_eq!(versions, vec![2, 0]);
}

#[tokio::test]
async fn other_author_comment_or_age_keeps_history() {
    let log = MemorySnapshotLog::new();
    let node = model();
    log.insert_version(at_version(&node, 1, "u1", 0), window()).await.unwrap();
    assert_eq!(log.insert_version(at_version(&node, 2, "u2", 1), window()).await.unwrap(), None);
    assert_eq!(log.insert_version(at_version(&node, 3, "u2", 30), window()).await.unwrap(), None);

    log.update_comment(Channel::Version, &node.id, 3, Some("keep".into()))
        .await
        .unwrap();
    assert_eq!(log.insert_version(at_version(&node, 4, "u2", 31), window()).await.unwrap(), None);
    assert_eq!(log.find_versions(&node.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn releases_are_numbered_per_node() {
    let log = MemorySnapshotLog::new();
    let a = model();
    let b = model();
    let r1 = log
        .insert_release(Snapshot::capture(&a, Channel::Release, "u1", None))
        .await
        .unwrap();
    let r2 = log
        .insert_release(Snapshot::capture(&a, Channel::Release, "u1", Some("second".into())))
        .await
        .unwrap();
    let b1 = log
        .insert_release(Snapshot::capture(&b, Channel::Release, "u1", None))
        .await
        .unwrap();
    assert_eq!((r1.number(), r2.number(), b1.number()), (1, 2, 1));
    assert_eq!(r2.combined_id(), format!("{}@r2", a.id));
    assert_eq!(log.find_latest_release(&a.id).await.unwrap().unwrap().number(), 2);
    assert!(log.find_release(&a.id, 3).await.unwrap().is_none());
    assert_eq!(
        log.find_releases(&a.id).await.unwrap().iter().map(Snapshot::number).collect::<Vec<_>>(),
        vec![2, 1]
    );
}

#[tokio::test]
async fn comment_update_needs_exactly_one_match() {
    let log = MemorySnapshotLog::new();
    let node = model();
    let err = log
        .update_comment(Channel::Release, &node.id, 1, Some("x".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Persistence(_)));
}

#[tokio::test]
async fn rename_touches_first_release_only() {
    let log = MemorySnapshotLog::new();
    let node = model();
    for _ in 0..2 {
        log.insert_release(Snapshot::capture(&node, Channel::Release, "u1", None))
            .await
            .unwrap();
    }
    assert_eq!(log.rename_releases(&node.id, "New").await.unwrap(), 1);
    assert_eq!(log.find_release(&node.id, 1).await.unwrap().unwrap().name, "New");
    assert_eq!(log.find_release(&node.id, 2).await.unwrap().unwrap().name, "M");
}

#[tokio::test]
async fn dependency_scan_and_purge() {
    let log = MemorySnapshotLog::new();
    let target = model();
    let mut user = model();
    user.process_dependencies = vec![target.id.clone()];
    log.insert_release(Snapshot::capture(&user, Channel::Release, "u1", None))
        .await
        .unwrap();
    log.insert_version(at_version(&user, 0, "u1", 0), window()).await.unwrap();

    let hits = log.find_releases_depending_on(&[target.id.clone()]).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].base_node_id, user.id);

    assert_eq!(log.purge(&[user.id.clone()]).await.unwrap(), 2);
    assert!(log.find_releases_depending_on(&[target.id]).await.unwrap().is_empty());
}

#[tokio::test]
async fn raw_insert_keeps_numbers_and_rejects_duplicates() {
    let log = MemorySnapshotLog::new();
    let node = model();
    let mut release = Snapshot::capture(&node, Channel::Release, "u1", None);
    release.release_number = Some(4);
    log.insert(release.clone()).await.unwrap();
    assert!(matches!(log.insert(release).await, Err(HubError::DocumentExists(_))));
    let next = log
        .insert_release(Snapshot::capture(&node, Channel::Release, "u1", None))
        .await
        .unwrap();
    assert_eq!(next.number(), 5);
}
