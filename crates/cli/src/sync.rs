//! Window selection and the push pipeline.

use crate::api_client::{SnapshotTransport, TransportError};
use crate::last_run::LastRunTracker;
use crate::payload::{PayloadError, PayloadRequest, PayloadSource, store_local_copy};
use calsnap_core::{RelativeTimeResolver, SnapshotKind, SnapshotWindow, WINDOW_MAX, WINDOW_MIN};
use std::path::PathBuf;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to produce payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("transport failure: {0}")]
    Transport(TransportError),

    #[error("server rejected the snapshot ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("owner credentials were rejected")]
    Unauthorized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("passphrase hashing failed: {0}")]
    Hash(#[source] calsnap_core::Error),

    #[error(transparent)]
    Window(#[from] calsnap_core::Error),
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized => Self::Unauthorized,
            TransportError::Rejected { status, message } => Self::Rejected { status, message },
            other => Self::Transport(other),
        }
    }
}

/// Which snapshot to push.
#[derive(Debug, Clone)]
pub enum SyncMode {
    Full,
    Partial {
        /// Start from the last successful run when a marker exists.
        continue_from_last_run: bool,
        start: Option<String>,
        end: Option<String>,
    },
}

impl SyncMode {
    pub fn kind(&self) -> SnapshotKind {
        match self {
            Self::Full => SnapshotKind::Full,
            Self::Partial { .. } => SnapshotKind::Partial,
        }
    }

    fn continues(&self) -> bool {
        matches!(
            self,
            Self::Partial {
                continue_from_last_run: true,
                ..
            }
        )
    }
}

/// Outcome of a successful push.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub kind: SnapshotKind,
    pub window: SnapshotWindow,
    pub payload_bytes: usize,
    pub uploaded: bool,
    pub local_copy: Option<PathBuf>,
    pub marker_updated: bool,
}

/// Runs one push: window, payload, optional local copy, upload, marker.
pub struct SyncOrchestrator<'a> {
    source: &'a dyn PayloadSource,
    transport: Option<&'a dyn SnapshotTransport>,
    tracker: &'a LastRunTracker,
    storage_dir: Option<PathBuf>,
    resolver: RelativeTimeResolver,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(source: &'a dyn PayloadSource, tracker: &'a LastRunTracker) -> Self {
        Self {
            source,
            transport: None,
            tracker,
            storage_dir: None,
            resolver: RelativeTimeResolver::new(),
        }
    }

    pub fn with_transport(mut self, transport: &'a dyn SnapshotTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Compute the window for `mode` as of `now`.
    pub async fn window(&self, mode: &SyncMode, now: OffsetDateTime) -> Result<SnapshotWindow, SyncError> {
        let SyncMode::Partial {
            continue_from_last_run,
            start,
            end,
        } = mode
        else {
            return Ok(SnapshotWindow::unbounded());
        };

        let last_run = if *continue_from_last_run {
            self.tracker.get().await
        } else {
            None
        };
        let start = match last_run {
            Some(at) => at,
            None => self.resolve_bound(start.as_deref(), now, WINDOW_MIN, "start"),
        };
        let end = self.resolve_bound(end.as_deref(), now, WINDOW_MAX, "end");

        Ok(SnapshotWindow::new(start, end)?)
    }

    fn resolve_bound(
        &self,
        expr: Option<&str>,
        now: OffsetDateTime,
        default: OffsetDateTime,
        which: &str,
    ) -> OffsetDateTime {
        let Some(expr) = expr.filter(|e| !e.trim().is_empty()) else {
            return default;
        };
        match self.resolver.resolve_at(expr, now) {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!(expression = expr, bound = which, error = %e, "Unparsable time expression, using default");
                default
            }
        }
    }

    /// Run the pipeline. `now` is the capture instant; it becomes the new
    /// last-run marker when continuing and everything succeeded.
    pub async fn run(&self, mode: &SyncMode, now: OffsetDateTime) -> Result<SyncReport, SyncError> {
        let kind = mode.kind();
        let window = self.window(mode, now).await?;
        tracing::info!(
            kind = kind.as_str(),
            start = %window.start(),
            end = %window.end(),
            "Capturing snapshot"
        );

        let data = self.source.acquire(&PayloadRequest { kind, window }).await?;

        let local_copy = match &self.storage_dir {
            Some(dir) => {
                let path = store_local_copy(dir, kind, now, &data).await?;
                tracing::info!(path = %path.display(), "Stored local copy");
                Some(path)
            }
            None => None,
        };

        let uploaded = match self.transport {
            Some(transport) => {
                transport.reserve_or_authenticate().await?;
                match kind {
                    SnapshotKind::Full => transport.upload_full(data.clone()).await?,
                    SnapshotKind::Partial => transport.upload_partial(window, data.clone()).await?,
                }
                tracing::info!(bytes = data.len(), "Snapshot uploaded");
                true
            }
            None => false,
        };

        let marker_updated = if mode.continues() {
            self.tracker.set(now).await?;
            true
        } else {
            false
        };

        Ok(SyncReport {
            kind,
            window,
            payload_bytes: data.len(),
            uploaded,
            local_copy,
            marker_updated,
        })
    }
}
