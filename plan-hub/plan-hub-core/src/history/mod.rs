//! Append-only snapshot history per node.
//!
//! Two channels share one log: version entries are written automatically
//! before every update, release entries are published explicitly and numbered
//! from 1 per node. Entries are immutable apart from their comment.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::node::{Channel, Snapshot};

pub mod memory;

#[cfg(test)]
mod tests;

pub use memory::MemorySnapshotLog;

/// Whether `previous` adds nothing once `next` is logged: same author, no
/// comment, modified less than `window` earlier, and not the first version.
pub fn is_redundant(previous: &Snapshot, next: &Snapshot, window: Duration) -> bool {
    previous.channel == Channel::Version
        && previous.version > 0
        && !previous.has_comment()
        && previous.last_modified_by == next.last_modified_by
        && within(previous.last_modified_at, next.last_modified_at, window)
}

fn within(earlier: DateTime<Utc>, later: DateTime<Utc>, window: Duration) -> bool {
    later >= earlier && later - earlier < window
}

#[async_trait]
pub trait SnapshotLog: Send + Sync {
    /// Append a version snapshot, pruning the latest one first when
    /// [`is_redundant`]. Returns the version number that was pruned, if any.
    async fn insert_version(&self, snapshot: Snapshot, prune_window: Duration) -> Result<Option<u64>>;

    /// Append a release with the next release number for its base node.
    async fn insert_release(&self, snapshot: Snapshot) -> Result<Snapshot>;

    /// Store an entry as is. Used when copying history under a new base id.
    async fn insert(&self, snapshot: Snapshot) -> Result<()>;

    async fn find_latest_version(&self, base_id: &str) -> Result<Option<Snapshot>>;

    async fn find_latest_release(&self, base_id: &str) -> Result<Option<Snapshot>>;

    async fn find_version(&self, base_id: &str, version: u64) -> Result<Option<Snapshot>>;

    async fn find_release(&self, base_id: &str, release: u64) -> Result<Option<Snapshot>>;

    /// Newest first.
    async fn find_versions(&self, base_id: &str) -> Result<Vec<Snapshot>>;

    /// Newest first.
    async fn find_releases(&self, base_id: &str) -> Result<Vec<Snapshot>>;

    /// Replace the comment of exactly one entry. Any other match count is a
    /// persistence failure.
    async fn update_comment(
        &self,
        channel: Channel,
        base_id: &str,
        number: u64,
        comment: Option<String>,
    ) -> Result<Snapshot>;

    /// Propagate a rename into the release channel. Only the first matching
    /// entry is touched; returns how many were.
    async fn rename_releases(&self, base_id: &str, name: &str) -> Result<usize>;

    /// Releases whose pinned dependencies mention any of `ids`.
    async fn find_releases_depending_on(&self, ids: &[String]) -> Result<Vec<Snapshot>>;

    /// Drop both channels for every id in `base_ids`.
    async fn purge(&self, base_ids: &[String]) -> Result<usize>;
}
