//! Persisted marker of the last successful sync.

use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// File name used next to the executable when no path is given.
pub const DEFAULT_FILE_NAME: &str = "lastrun.txt";

/// Reads and writes a single RFC 3339 instant.
#[derive(Debug, Clone)]
pub struct LastRunTracker {
    path: PathBuf,
}

impl LastRunTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Tracker stored as `lastrun.txt` in the executable's directory.
    pub fn beside_executable() -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory")
        })?;
        Ok(Self::new(dir.join(DEFAULT_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored instant, or `None` if the file is missing or unreadable.
    pub async fn get(&self) -> Option<OffsetDateTime> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read last-run marker");
                return None;
            }
        };

        match OffsetDateTime::parse(contents.trim(), &Rfc3339) {
            Ok(at) => Some(at),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt last-run marker");
                None
            }
        }
    }

    /// Replace the stored instant. The previous value stays intact if this fails.
    pub async fn set(&self, at: OffsetDateTime) -> io::Result<()> {
        let text = at
            .format(&Rfc3339)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, text).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }
}
