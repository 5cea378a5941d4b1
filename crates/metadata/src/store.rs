//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{OwnerRepo, SnapshotRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: OwnerRepo + SnapshotRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(600));

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and a single
        // connection keeps multi-statement transactions from hitting SQLITE_BUSY.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = store.query_timeout.as_secs(),
            "SQLite metadata store opened"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Log queries that run longer than the advisory timeout.
    fn warn_if_slow(&self, operation: &'static str, started: std::time::Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "SQLite query exceeded advisory timeout"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// SQLite has a limit of ~999 bound parameters per statement.
const BATCH_SIZE: usize = 900;

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

mod sqlite_impl {
    use super::*;
    use crate::models::{OwnerRow, Reservation, SnapshotRow};
    use crate::repos::NewSnapshot;
    use calsnap_core::{SnapshotId, SnapshotKind};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl OwnerRepo for SqliteStore {
        async fn reserve_owner(
            &self,
            owner_name: &str,
            passphrase_hash: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Reservation> {
            let result = sqlx::query(
                r#"
                INSERT INTO owners (owner_id, owner_name, passphrase_hash, created_at, last_seen_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(owner_name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(owner_name)
            .bind(passphrase_hash)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            let owner = self.get_owner_by_name(owner_name).await?.ok_or_else(|| {
                MetadataError::Internal(format!("owner '{owner_name}' vanished after reserve"))
            })?;

            Ok(Reservation {
                owner,
                created: result.rows_affected() > 0,
            })
        }

        async fn get_owner_by_name(&self, owner_name: &str) -> MetadataResult<Option<OwnerRow>> {
            let row = sqlx::query_as::<_, OwnerRow>("SELECT * FROM owners WHERE owner_name = ?")
                .bind(owner_name)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_owner(&self, owner_id: Uuid) -> MetadataResult<Option<OwnerRow>> {
            let row = sqlx::query_as::<_, OwnerRow>("SELECT * FROM owners WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_owner(
            &self,
            owner_id: Uuid,
            seen_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE owners SET last_seen_at = ? WHERE owner_id = ?")
                .bind(seen_at)
                .bind(owner_id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "owner_id {owner_id} not found"
                )));
            }
            Ok(())
        }

        async fn list_owners(&self) -> MetadataResult<Vec<OwnerRow>> {
            let rows = sqlx::query_as::<_, OwnerRow>("SELECT * FROM owners ORDER BY owner_name")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn remove_owner(&self, owner_id: Uuid) -> MetadataResult<()> {
            let removed = self.delete_empty_owners(&[owner_id], None).await?;
            if removed > 0 {
                return Ok(());
            }

            if self.get_owner(owner_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!(
                    "owner_id {owner_id} not found"
                )));
            }
            Err(MetadataError::Constraint(format!(
                "owner_id {owner_id} still has snapshots"
            )))
        }

        async fn remove_idle_owners(
            &self,
            owner_ids: &[Uuid],
            seen_before: OffsetDateTime,
        ) -> MetadataResult<u64> {
            self.delete_empty_owners(owner_ids, Some(seen_before)).await
        }
    }

    impl SqliteStore {
        /// Delete owners without snapshots. With `seen_before`, owners whose
        /// `last_seen_at` is later than it are kept. Both checks run inside the
        /// deleting transaction.
        async fn delete_empty_owners(
            &self,
            owner_ids: &[Uuid],
            seen_before: Option<OffsetDateTime>,
        ) -> MetadataResult<u64> {
            if owner_ids.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await?;
            let mut removed = 0;

            for batch in owner_ids.chunks(BATCH_SIZE) {
                let query = format!(
                    "SELECT owner_id, last_seen_at FROM owners WHERE owner_id IN ({}) \
                     AND NOT EXISTS (SELECT 1 FROM snapshots s WHERE s.owner_id = owners.owner_id)",
                    placeholders(batch.len())
                );
                let mut q = sqlx::query_as::<_, (Uuid, OffsetDateTime)>(&query);
                for id in batch {
                    q = q.bind(id);
                }
                // Timestamps are compared decoded; their stored text does not sort
                // chronologically when fractional seconds differ.
                let doomed: Vec<Uuid> = q
                    .fetch_all(&mut *tx)
                    .await?
                    .into_iter()
                    .filter(|(_, last_seen)| {
                        seen_before.is_none_or(|cutoff| *last_seen <= cutoff)
                    })
                    .map(|(owner_id, _)| owner_id)
                    .collect();
                if doomed.is_empty() {
                    continue;
                }

                let query = format!(
                    "DELETE FROM owners WHERE owner_id IN ({})",
                    placeholders(doomed.len())
                );
                let mut q = sqlx::query(&query);
                for id in &doomed {
                    q = q.bind(id);
                }
                removed += q.execute(&mut *tx).await?.rows_affected();
            }

            tx.commit().await?;
            Ok(removed)
        }
    }

    #[async_trait]
    impl SnapshotRepo for SqliteStore {
        async fn add_snapshot(
            &self,
            snapshot: NewSnapshot<'_>,
            now: OffsetDateTime,
        ) -> MetadataResult<SnapshotRow> {
            if snapshot.data.is_empty() {
                return Err(MetadataError::Constraint(
                    "snapshot payload is empty".to_string(),
                ));
            }
            match (snapshot.kind, snapshot.window) {
                (SnapshotKind::Full, Some(_)) => {
                    return Err(MetadataError::Constraint(
                        "full snapshots cannot carry a window".to_string(),
                    ));
                }
                (SnapshotKind::Partial, None) => {
                    return Err(MetadataError::Constraint(
                        "partial snapshots require a window".to_string(),
                    ));
                }
                _ => {}
            }

            let started = std::time::Instant::now();
            let size_bytes = i64::try_from(snapshot.data.len()).map_err(|_| {
                MetadataError::Constraint("snapshot payload is too large".to_string())
            })?;

            let mut tx = self.pool.begin().await?;

            let previous: Option<OffsetDateTime> = sqlx::query_scalar(
                "SELECT created_at FROM snapshots ORDER BY snapshot_id DESC LIMIT 1",
            )
            .fetch_optional(&mut *tx)
            .await?;

            let created_at = match previous {
                Some(prev) if prev >= now => prev + time::Duration::microseconds(1),
                _ => now,
            };

            let row = sqlx::query_as::<_, SnapshotRow>(
                r#"
                INSERT INTO snapshots (owner_id, created_at, kind, window_start, window_end, size_bytes)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(snapshot.owner_id)
            .bind(created_at)
            .bind(snapshot.kind.as_str())
            .bind(snapshot.window.map(|w| w.start()))
            .bind(snapshot.window.map(|w| w.end()))
            .bind(size_bytes)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.message().contains("FOREIGN KEY constraint")
                {
                    return MetadataError::NotFound(format!(
                        "owner_id {} not found",
                        snapshot.owner_id
                    ));
                }
                MetadataError::from_insert(e, format!("snapshot at {created_at}"))
            })?;

            sqlx::query("INSERT INTO blobs (snapshot_id, data) VALUES (?, ?)")
                .bind(row.snapshot_id)
                .bind(snapshot.data)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    MetadataError::from_insert(e, format!("blob for snapshot {}", row.snapshot_id))
                })?;

            tx.commit().await?;
            self.warn_if_slow("add_snapshot", started);

            Ok(row)
        }

        async fn list_snapshots(&self, owner_id: Uuid) -> MetadataResult<Vec<SnapshotRow>> {
            let rows = sqlx::query_as::<_, SnapshotRow>(
                "SELECT * FROM snapshots WHERE owner_id = ? ORDER BY snapshot_id ASC",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_snapshot(
            &self,
            owner_id: Uuid,
            snapshot_id: SnapshotId,
        ) -> MetadataResult<Option<SnapshotRow>> {
            let row = sqlx::query_as::<_, SnapshotRow>(
                "SELECT * FROM snapshots WHERE snapshot_id = ? AND owner_id = ?",
            )
            .bind(snapshot_id.get())
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_blob(
            &self,
            owner_id: Uuid,
            snapshot_id: SnapshotId,
        ) -> MetadataResult<Vec<u8>> {
            let started = std::time::Instant::now();
            let data: Option<Vec<u8>> = sqlx::query_scalar(
                r#"
                SELECT b.data FROM blobs b
                JOIN snapshots s ON s.snapshot_id = b.snapshot_id
                WHERE b.snapshot_id = ? AND s.owner_id = ?
                "#,
            )
            .bind(snapshot_id.get())
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
            self.warn_if_slow("get_blob", started);

            data.ok_or_else(|| MetadataError::NotFound(format!("snapshot {snapshot_id} not found")))
        }

        async fn remove_snapshots(&self, snapshot_ids: &[SnapshotId]) -> MetadataResult<u64> {
            if snapshot_ids.is_empty() {
                return Ok(0);
            }

            let started = std::time::Instant::now();
            let mut tx = self.pool.begin().await?;
            let mut removed = 0;

            // Blobs go with their snapshot through ON DELETE CASCADE.
            for batch in snapshot_ids.chunks(BATCH_SIZE) {
                let query = format!(
                    "DELETE FROM snapshots WHERE snapshot_id IN ({})",
                    placeholders(batch.len())
                );
                let mut q = sqlx::query(&query);
                for id in batch {
                    q = q.bind(id.get());
                }
                removed += q.execute(&mut *tx).await?.rows_affected();
            }

            tx.commit().await?;
            self.warn_if_slow("remove_snapshots", started);
            Ok(removed)
        }

        async fn count_snapshots(&self, owner_id: Option<Uuid>) -> MetadataResult<u64> {
            let count: i64 = match owner_id {
                Some(owner_id) => {
                    sqlx::query_scalar("SELECT COUNT(*) FROM snapshots WHERE owner_id = ?")
                        .bind(owner_id)
                        .fetch_one(&self.pool)
                        .await?
                }
                None => {
                    sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
                        .fetch_one(&self.pool)
                        .await?
                }
            };
            Ok(count as u64)
        }
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS owners (
    owner_id BLOB PRIMARY KEY,
    owner_name TEXT NOT NULL UNIQUE,
    passphrase_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

-- snapshot_id order is creation order: created_at is forced to increase on insert.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id BLOB NOT NULL REFERENCES owners(owner_id),
    created_at TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    window_start TEXT,
    window_end TEXT,
    size_bytes INTEGER NOT NULL,
    CHECK ((window_start IS NULL) = (window_end IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_snapshots_owner ON snapshots(owner_id, snapshot_id);

CREATE TABLE IF NOT EXISTS blobs (
    blob_id INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot_id INTEGER NOT NULL UNIQUE REFERENCES snapshots(snapshot_id) ON DELETE CASCADE,
    data BLOB NOT NULL
);
"#;
