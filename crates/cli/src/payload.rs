//! Payload sources: where the opaque snapshot archive comes from.

use async_trait::async_trait;
use bytes::Bytes;
use calsnap_core::{SnapshotKind, SnapshotWindow};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Environment variables handed to an exporter command.
pub const ENV_WINDOW_START: &str = "CALSNAP_WINDOW_START";
pub const ENV_WINDOW_END: &str = "CALSNAP_WINDOW_END";
pub const ENV_SNAPSHOT_KIND: &str = "CALSNAP_SNAPSHOT_KIND";

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("exporter exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("payload is empty")]
    Empty,

    #[error("cannot format window bound: {0}")]
    Format(String),
}

/// What the payload has to cover.
#[derive(Debug, Clone, Copy)]
pub struct PayloadRequest {
    pub kind: SnapshotKind,
    pub window: SnapshotWindow,
}

/// Produces the packaged snapshot bytes for a window.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn acquire(&self, request: &PayloadRequest) -> Result<Bytes, PayloadError>;
}

/// An archive that was already packaged elsewhere.
#[derive(Debug, Clone)]
pub struct FilePayload {
    path: PathBuf,
}

impl FilePayload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PayloadSource for FilePayload {
    async fn acquire(&self, _request: &PayloadRequest) -> Result<Bytes, PayloadError> {
        let data = tokio::fs::read(&self.path).await?;
        non_empty(Bytes::from(data))
    }
}

/// An exporter program whose stdout is the archive.
///
/// The window and kind are passed through `CALSNAP_WINDOW_START`,
/// `CALSNAP_WINDOW_END` and `CALSNAP_SNAPSHOT_KIND`.
#[derive(Debug, Clone)]
pub struct CommandPayload {
    program: String,
    args: Vec<String>,
}

impl CommandPayload {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl PayloadSource for CommandPayload {
    async fn acquire(&self, request: &PayloadRequest) -> Result<Bytes, PayloadError> {
        let start = format_bound(request.window.start())?;
        let end = format_bound(request.window.end())?;

        tracing::debug!(program = %self.program, kind = request.kind.as_str(), "Running exporter");
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env(ENV_WINDOW_START, start)
            .env(ENV_WINDOW_END, end)
            .env(ENV_SNAPSHOT_KIND, request.kind.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(PayloadError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        non_empty(Bytes::from(output.stdout))
    }
}

fn non_empty(data: Bytes) -> Result<Bytes, PayloadError> {
    if data.is_empty() {
        return Err(PayloadError::Empty);
    }
    Ok(data)
}

fn format_bound(at: OffsetDateTime) -> Result<String, PayloadError> {
    at.format(&Rfc3339)
        .map_err(|e| PayloadError::Format(e.to_string()))
}

/// Write a local copy as `<kind>-<timestamp>.bin` in `dir`.
pub async fn store_local_copy(
    dir: &Path,
    kind: SnapshotKind,
    captured_at: OffsetDateTime,
    data: &[u8],
) -> Result<PathBuf, PayloadError> {
    let stamp = captured_at
        .format(format_description!(
            "[year][month][day]T[hour][minute][second]Z"
        ))
        .map_err(|e| PayloadError::Format(e.to_string()))?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}-{stamp}.bin", kind.as_str()));
    tokio::fs::write(&path, data).await?;
    Ok(path)
}
