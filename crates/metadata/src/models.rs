//! Database models mapping to the snapshot schema.

use calsnap_core::{SnapshotId, SnapshotInfo, SnapshotKind};
use sqlx::FromRow;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Owner record.
#[derive(Clone, FromRow)]
pub struct OwnerRow {
    pub owner_id: Uuid,
    pub owner_name: String,
    pub passphrase_hash: String,
    pub created_at: OffsetDateTime,
    pub last_seen_at: OffsetDateTime,
}

impl fmt::Debug for OwnerRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRow")
            .field("owner_id", &self.owner_id)
            .field("owner_name", &self.owner_name)
            .field("passphrase_hash", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("last_seen_at", &self.last_seen_at)
            .finish()
    }
}

/// Result of a reserve call: the owner, and whether this call created it.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub owner: OwnerRow,
    pub created: bool,
}

/// Snapshot record (without its payload).
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    pub snapshot_id: i64,
    pub owner_id: Uuid,
    pub created_at: OffsetDateTime,
    /// Stored kind; values other than `full`/`partial` are unrecognized.
    pub kind: String,
    pub window_start: Option<OffsetDateTime>,
    pub window_end: Option<OffsetDateTime>,
    pub size_bytes: i64,
}

impl SnapshotRow {
    pub fn id(&self) -> SnapshotId {
        SnapshotId::new(self.snapshot_id)
    }

    /// Parsed kind, or `None` for unrecognized values.
    pub fn kind(&self) -> Option<SnapshotKind> {
        SnapshotKind::from_db(&self.kind)
    }

    /// Listing record for clients. `None` for unrecognized kinds.
    pub fn to_info(&self) -> Option<SnapshotInfo> {
        Some(SnapshotInfo {
            id: self.id(),
            timestamp: self.created_at,
            kind: self.kind()?,
            window_start: self.window_start,
            window_end: self.window_end,
        })
    }
}
