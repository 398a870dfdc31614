use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::RwLock;
use tracing::debug;

use super::{is_redundant, SnapshotLog};
use crate::error::{HubError, Result};
use crate::node::{Channel, Snapshot};

type Key = (Channel, String);

/// Snapshot log kept in process memory, entries per channel in insertion order.
#[derive(Default)]
pub struct MemorySnapshotLog {
    entries: RwLock<HashMap<Key, Vec<Snapshot>>>,
}

impl MemorySnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(channel: Channel, base_id: &str) -> Key {
        (channel, base_id.to_string())
    }

    fn newest_first(&self, channel: Channel, base_id: &str) -> Vec<Snapshot> {
        let mut out = self
            .entries
            .read()
            .get(&Self::key(channel, base_id))
            .cloned()
            .unwrap_or_default();
        out.sort_by(|a, b| b.number().cmp(&a.number()));
        out
    }

    fn find(&self, channel: Channel, base_id: &str, number: u64) -> Option<Snapshot> {
        self.entries
            .read()
            .get(&Self::key(channel, base_id))
            .and_then(|list| list.iter().find(|s| s.number() == number).cloned())
    }
}

#[async_trait]
impl SnapshotLog for MemorySnapshotLog {
    async fn insert_version(&self, snapshot: Snapshot, prune_window: Duration) -> Result<Option<u64>> {
        if snapshot.channel != Channel::Version {
            return Err(HubError::BadRequest("expected a version snapshot".into()));
        }
        let mut entries = self.entries.write();
        let list = entries
            .entry(Self::key(Channel::Version, &snapshot.base_node_id))
            .or_default();

        let mut pruned = None;
        if let Some(pos) = list
            .iter()
            .enumerate()
            .max_by_key(|(_, s)| s.version)
            .map(|(pos, _)| pos)
        {
            if list[pos].version < snapshot.version && is_redundant(&list[pos], &snapshot, prune_window) {
                let gone = list.remove(pos);
                debug!(node = %gone.base_node_id, version = gone.version, "pruned redundant version");
                pruned = Some(gone.version);
            }
        }
        // a retried update re-captures the same pre-image
        list.retain(|s| s.version != snapshot.version);
        list.push(snapshot);
        Ok(pruned)
    }

    async fn insert_release(&self, mut snapshot: Snapshot) -> Result<Snapshot> {
        if snapshot.channel != Channel::Release {
            return Err(HubError::BadRequest("expected a release snapshot".into()));
        }
        let mut entries = self.entries.write();
        let list = entries
            .entry(Self::key(Channel::Release, &snapshot.base_node_id))
            .or_default();
        let next = list.iter().map(Snapshot::number).max().unwrap_or(0) + 1;
        snapshot.release_number = Some(next);
        list.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn insert(&self, snapshot: Snapshot) -> Result<()> {
        let mut entries = self.entries.write();
        let list = entries
            .entry(Self::key(snapshot.channel, &snapshot.base_node_id))
            .or_default();
        if list.iter().any(|s| s.number() == snapshot.number()) {
            return Err(HubError::DocumentExists(snapshot.combined_id()));
        }
        list.push(snapshot);
        Ok(())
    }

    async fn find_latest_version(&self, base_id: &str) -> Result<Option<Snapshot>> {
        Ok(self.newest_first(Channel::Version, base_id).into_iter().next())
    }

    async fn find_latest_release(&self, base_id: &str) -> Result<Option<Snapshot>> {
        Ok(self.newest_first(Channel::Release, base_id).into_iter().next())
    }

    async fn find_version(&self, base_id: &str, version: u64) -> Result<Option<Snapshot>> {
        Ok(self.find(Channel::Version, base_id, version))
    }

    async fn find_release(&self, base_id: &str, release: u64) -> Result<Option<Snapshot>> {
        Ok(self.find(Channel::Release, base_id, release))
    }

    async fn find_versions(&self, base_id: &str) -> Result<Vec<Snapshot>> {
        Ok(self.newest_first(Channel::Version, base_id))
    }

    async fn find_releases(&self, base_id: &str) -> Result<Vec<Snapshot>> {
        Ok(self.newest_first(Channel::Release, base_id))
    }

    async fn update_comment(
        &self,
        channel: Channel,
        base_id: &str,
        number: u64,
        comment: Option<String>,
    ) -> Result<Snapshot> {
        let mut entries = self.entries.write();
        let mut matched: Vec<&mut Snapshot> = entries
            .get_mut(&Self::key(channel, base_id))
            .map(|list| list.iter_mut().filter(|s| s.number() == number).collect())
            .unwrap_or_default();
        if matched.len() != 1 {
            return Err(HubError::Persistence(format!(
                "comment update on {base_id} {channel:?} {number} matched {} entries",
                matched.len()
            )));
        }
        let entry = &mut *matched[0];
        entry.comment = comment.filter(|c| !c.trim().is_empty());
        Ok(entry.clone())
    }

    async fn rename_releases(&self, base_id: &str, name: &str) -> Result<usize> {
        let mut entries = self.entries.write();
        let first = entries
            .get_mut(&Self::key(Channel::Release, base_id))
            .and_then(|list| list.first_mut());
        match first {
            Some(entry) => {
                entry.name = name.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_releases_depending_on(&self, ids: &[String]) -> Result<Vec<Snapshot>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|((channel, _), _)| *channel == Channel::Release)
            .flat_map(|(_, list)| list.iter())
            .filter(|s| s.process_dependencies.iter().any(|d| ids.contains(d)))
            .cloned()
            .collect())
    }

    async fn purge(&self, base_ids: &[String]) -> Result<usize> {
        let mut entries = self.entries.write();
        let mut removed = 0;
        entries.retain(|(_, base), list| {
            if base_ids.contains(base) {
                removed += list.len();
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}
