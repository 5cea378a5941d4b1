//! Owner repository.

use crate::error::MetadataResult;
use crate::models::{OwnerRow, Reservation};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for owner operations.
#[async_trait]
pub trait OwnerRepo: Send + Sync {
    /// Create the owner if the name is unused, otherwise return the existing one.
    ///
    /// The insert is conditional at the database level, so concurrent callers
    /// (even from other processes) cannot create two owners with one name.
    async fn reserve_owner(
        &self,
        owner_name: &str,
        passphrase_hash: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Reservation>;

    /// Get an owner by name.
    async fn get_owner_by_name(&self, owner_name: &str) -> MetadataResult<Option<OwnerRow>>;

    /// Get an owner by ID.
    async fn get_owner(&self, owner_id: Uuid) -> MetadataResult<Option<OwnerRow>>;

    /// Update the last-seen time.
    async fn touch_owner(&self, owner_id: Uuid, seen_at: OffsetDateTime) -> MetadataResult<()>;

    /// List all owners ordered by name.
    async fn list_owners(&self) -> MetadataResult<Vec<OwnerRow>>;

    /// Delete an owner. Fails with `Constraint` while it still has snapshots.
    async fn remove_owner(&self, owner_id: Uuid) -> MetadataResult<()>;

    /// Delete the given owners in one transaction, skipping any that gained
    /// snapshots or were seen after `seen_before` in the meantime. Returns how
    /// many were deleted.
    async fn remove_idle_owners(
        &self,
        owner_ids: &[Uuid],
        seen_before: OffsetDateTime,
    ) -> MetadataResult<u64>;
}
