//! Snapshot and blob repository.

use crate::error::MetadataResult;
use crate::models::SnapshotRow;
use async_trait::async_trait;
use calsnap_core::{SnapshotId, SnapshotKind, SnapshotWindow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Input for [`SnapshotRepo::add_snapshot`].
#[derive(Debug, Clone, Copy)]
pub struct NewSnapshot<'a> {
    pub owner_id: Uuid,
    pub kind: SnapshotKind,
    /// Required for partial snapshots, absent for full ones.
    pub window: Option<SnapshotWindow>,
    pub data: &'a [u8],
}

/// Repository for snapshot and blob operations.
#[async_trait]
pub trait SnapshotRepo: Send + Sync {
    /// Insert a snapshot and its blob atomically.
    ///
    /// Fails with `Constraint` when `data` is empty or the window does not
    /// match the kind. The stored creation time is `now`, bumped forward if
    /// needed so it stays strictly greater than every earlier snapshot's.
    async fn add_snapshot(
        &self,
        snapshot: NewSnapshot<'_>,
        now: OffsetDateTime,
    ) -> MetadataResult<SnapshotRow>;

    /// List an owner's snapshots, oldest first.
    async fn list_snapshots(&self, owner_id: Uuid) -> MetadataResult<Vec<SnapshotRow>>;

    /// Get one of an owner's snapshots.
    async fn get_snapshot(
        &self,
        owner_id: Uuid,
        snapshot_id: SnapshotId,
    ) -> MetadataResult<Option<SnapshotRow>>;

    /// Get a snapshot's payload. `NotFound` if the snapshot is absent or
    /// belongs to another owner.
    async fn get_blob(&self, owner_id: Uuid, snapshot_id: SnapshotId) -> MetadataResult<Vec<u8>>;

    /// Delete snapshots (and their blobs) in one transaction. Returns how many were deleted.
    async fn remove_snapshots(&self, snapshot_ids: &[SnapshotId]) -> MetadataResult<u64>;

    /// Count snapshots for an owner (or all if owner_id is None).
    async fn count_snapshots(&self, owner_id: Option<Uuid>) -> MetadataResult<u64>;
}
