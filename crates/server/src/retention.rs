//! Snapshot retention: per-owner cap and age eviction plus idle owner cleanup.

use crate::metrics::{
    OWNERS_PRUNED, OWNERS_TRACKED, RETENTION_ERRORS, RETENTION_SWEEP_DURATION, RETENTION_SWEEPS,
    SNAPSHOTS_PRUNED, SNAPSHOTS_RETAINED,
};
use calsnap_core::config::RetentionConfig;
use calsnap_core::{SnapshotId, SnapshotKind};
use calsnap_metadata::models::SnapshotRow;
use calsnap_metadata::repos::{OwnerRepo, SnapshotRepo};
use calsnap_metadata::{MetadataResult, MetadataStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Limits applied by a sweep.
#[derive(Clone, Debug)]
pub struct RetentionPolicy {
    pub max_partial: usize,
    pub max_full: usize,
    pub max_age: time::Duration,
    pub delete_empty_owners: bool,
    pub idle_owner_grace: time::Duration,
}

impl RetentionPolicy {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            max_partial: config.max_partial_snapshots as usize,
            max_full: config.max_full_snapshots as usize,
            max_age: config.max_snapshot_age(),
            delete_empty_owners: config.delete_empty_owners,
            idle_owner_grace: config.idle_owner_grace(),
        }
    }

    fn cap(&self, kind: SnapshotKind) -> usize {
        match kind {
            SnapshotKind::Full => self.max_full,
            SnapshotKind::Partial => self.max_partial,
        }
    }
}

/// Outcome of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub owners_scanned: u64,
    pub snapshots_removed: u64,
    pub owners_removed: u64,
    pub errors: u64,
}

/// Choose which of one owner's snapshots to remove.
///
/// Expired snapshots and snapshots of an unrecognized kind are always
/// removed. Of the rest, each kind keeps its newest `cap` entries. Ordering
/// is by creation time, then id.
pub fn plan_owner_sweep(
    snapshots: &[SnapshotRow],
    policy: &RetentionPolicy,
    now: OffsetDateTime,
) -> Vec<SnapshotId> {
    let mut ordered: Vec<&SnapshotRow> = snapshots.iter().collect();
    ordered.sort_by_key(|s| (s.created_at, s.snapshot_id));

    let mut doomed = Vec::new();
    let mut partial = Vec::new();
    let mut full = Vec::new();

    for snapshot in ordered {
        let expired = now - snapshot.created_at > policy.max_age;
        match snapshot.kind() {
            _ if expired => doomed.push(snapshot.id()),
            None => doomed.push(snapshot.id()),
            Some(SnapshotKind::Partial) => partial.push(snapshot.id()),
            Some(SnapshotKind::Full) => full.push(snapshot.id()),
        }
    }

    for (kind, bucket) in [(SnapshotKind::Partial, partial), (SnapshotKind::Full, full)] {
        let overflow = bucket.len().saturating_sub(policy.cap(kind));
        doomed.extend(bucket.into_iter().take(overflow));
    }

    doomed
}

/// Applies a [`RetentionPolicy`] to the whole store.
pub struct RetentionEngine {
    metadata: Arc<dyn MetadataStore>,
    policy: RetentionPolicy,
}

impl RetentionEngine {
    pub fn new(metadata: Arc<dyn MetadataStore>, policy: RetentionPolicy) -> Self {
        Self { metadata, policy }
    }

    /// Run one sweep as of `now`. Per-owner failures are logged and counted;
    /// only a failure to list owners aborts the sweep.
    pub async fn sweep(&self, now: OffsetDateTime) -> MetadataResult<SweepStats> {
        let start = Instant::now();
        let mut stats = SweepStats::default();

        let owners = self.metadata.list_owners().await?;
        let idle_cutoff = now.checked_sub(self.policy.idle_owner_grace);
        let mut empty_candidates = Vec::new();
        let mut retained = 0;

        for owner in &owners {
            stats.owners_scanned += 1;
            match self.sweep_owner(owner.owner_id, now).await {
                Ok((removed, remaining)) => {
                    stats.snapshots_removed += removed;
                    retained += remaining as u64;
                    let idle = idle_cutoff.is_some_and(|cutoff| owner.last_seen_at <= cutoff);
                    if remaining == 0 && idle {
                        empty_candidates.push(owner.owner_id);
                    }
                }
                Err(e) => {
                    stats.errors += 1;
                    RETENTION_ERRORS.inc();
                    tracing::warn!(
                        owner_id = %owner.owner_id,
                        error = %e,
                        "Retention sweep failed for owner"
                    );
                }
            }
        }

        let cleanup = self.policy.delete_empty_owners && !empty_candidates.is_empty();
        if let Some(cutoff) = idle_cutoff.filter(|_| cleanup) {
            // The cutoff is re-checked at delete time: an owner seen during the
            // sweep is kept.
            match self.metadata.remove_idle_owners(&empty_candidates, cutoff).await {
                Ok(removed) => stats.owners_removed = removed,
                Err(e) => {
                    stats.errors += 1;
                    RETENTION_ERRORS.inc();
                    tracing::warn!(error = %e, "Failed to remove idle owners");
                }
            }
        }

        RETENTION_SWEEPS.inc();
        SNAPSHOTS_PRUNED.inc_by(stats.snapshots_removed);
        OWNERS_PRUNED.inc_by(stats.owners_removed);
        OWNERS_TRACKED.set(stats.owners_scanned.saturating_sub(stats.owners_removed) as i64);
        SNAPSHOTS_RETAINED.set(retained as i64);
        RETENTION_SWEEP_DURATION.observe(start.elapsed().as_secs_f64());

        tracing::info!(
            owners_scanned = stats.owners_scanned,
            snapshots_removed = stats.snapshots_removed,
            owners_removed = stats.owners_removed,
            errors = stats.errors,
            "Retention sweep completed"
        );

        Ok(stats)
    }

    /// Returns (removed, remaining).
    async fn sweep_owner(&self, owner_id: Uuid, now: OffsetDateTime) -> MetadataResult<(u64, usize)> {
        let snapshots = self.metadata.list_snapshots(owner_id).await?;
        let doomed = plan_owner_sweep(&snapshots, &self.policy, now);
        if doomed.is_empty() {
            return Ok((0, snapshots.len()));
        }

        let removed = self.metadata.remove_snapshots(&doomed).await?;
        tracing::debug!(owner_id = %owner_id, removed, "Pruned snapshots");
        Ok((removed, snapshots.len().saturating_sub(doomed.len())))
    }
}

/// Spawn the periodic sweep. The first sweep runs one interval after start;
/// the task exits when `cancel` fires.
pub fn spawn_retention_task(
    engine: Arc<RetentionEngine>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retention task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = engine.sweep(OffsetDateTime::now_utc()).await {
                        RETENTION_ERRORS.inc();
                        tracing::error!(error = %e, "Retention sweep aborted");
                    }
                }
            }
        }
    })
}
