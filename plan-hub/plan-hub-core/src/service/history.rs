use tracing::info;

use super::NodeService;
use crate::combined_id::{CombinedId, IdKind};
use crate::error::{HubError, Result};
use crate::events::NodeEvent;
use crate::node::{AppUser, Channel, Node, Permission, Snapshot};
use crate::storage::{ExpectedVersion, NodeChanges, Projection};

impl NodeService {
    async fn readable(&self, user: &AppUser, id: &str) -> Result<Node> {
        let groups = self.group_ids(user).await?;
        let live = self.live(id, Projection::Sparse).await?;
        self.authorize(user, &live, &groups, Permission::Read).await?;
        Ok(live)
    }

    /// Version snapshots of `id`, newest first.
    pub async fn history(&self, user: &AppUser, id: &str) -> Result<Vec<Snapshot>> {
        let live = self.readable(user, &Self::live_id(id)?).await?;
        self.log.find_versions(&live.id).await
    }

    /// Releases of `id`, newest first.
    pub async fn releases(&self, user: &AppUser, id: &str) -> Result<Vec<Snapshot>> {
        let live = self.readable(user, &Self::live_id(id)?).await?;
        self.log.find_releases(&live.id).await
    }

    /// Publish the current state of `id` as its next release.
    pub async fn create_release(
        &self,
        user: &AppUser,
        id: &str,
        expected: ExpectedVersion,
        comment: Option<String>,
    ) -> Result<Snapshot> {
        let live = self.writable(user, id).await?;
        Self::check_version(&live, expected)?;
        let release = self
            .log
            .insert_release(Snapshot::capture(&live, Channel::Release, &user.id, comment))
            .await?;
        info!(id = %live.id, release = release.number(), "published release");
        self.events.send(NodeEvent::Released {
            id: live.id,
            release: release.number(),
        });
        Ok(release)
    }

    fn historical_id(raw: &str) -> Result<(CombinedId, Channel, u64)> {
        let cid = CombinedId::parse(raw)?;
        match (cid.kind, cid.number) {
            (IdKind::Version, Some(n)) => Ok((cid, Channel::Version, n)),
            (IdKind::Release, Some(n)) => Ok((cid, Channel::Release, n)),
            _ => Err(HubError::BadRequest(format!(
                "{raw} does not address a version or release"
            ))),
        }
    }

    async fn find_entry(&self, base_id: &str, channel: Channel, number: u64) -> Result<Option<Snapshot>> {
        match channel {
            Channel::Version => self.log.find_version(base_id, number).await,
            Channel::Release => self.log.find_release(base_id, number).await,
        }
    }

    /// Edit the comment of a version or release. Only its author may.
    pub async fn update_comment(
        &self,
        user: &AppUser,
        id: &str,
        comment: Option<String>,
    ) -> Result<Snapshot> {
        let (cid, channel, number) = Self::historical_id(id)?;
        let live = self.readable(user, &cid.base_id).await?;
        let entry = self
            .find_entry(&live.id, channel, number)
            .await?
            .ok_or_else(|| HubError::not_found(id.to_string()))?;
        if entry.last_modified_by != user.id {
            return Err(HubError::forbidden(format!(
                "only {} may edit the comment on {id}",
                entry.last_modified_by
            )));
        }
        self.log
            .update_comment(channel, &live.id, number, comment)
            .await
    }

    /// Make the content of a historical entry the live content again.
    pub async fn restore_version(
        &self,
        user: &AppUser,
        id: &str,
        expected: ExpectedVersion,
    ) -> Result<Node> {
        let (cid, channel, number) = Self::historical_id(id)?;
        let live = self.writable(user, &cid.base_id).await?;
        Self::check_version(&live, expected)?;
        let entry = self
            .find_entry(&live.id, channel, number)
            .await?
            .ok_or_else(|| HubError::not_found(id.to_string()))?;

        let deps = self.prepare_content(&live, &entry.content).await?;
        let changes = NodeChanges {
            content: Some(entry.content),
            process_dependencies: Some(deps),
            ..NodeChanges::default()
        };
        let updated = self
            .commit(user, &live, expected, changes, Some(format!("before restoring {cid}")))
            .await?;
        info!(id = %updated.id, from = %cid, version = updated.version, "restored historical content");
        Ok(updated)
    }
}
