//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Lowest effective retention interval; shorter configured values are raised to this.
pub const MIN_CLEANUP_INTERVAL_SECS: i64 = 60;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted snapshot payload in bytes. Larger bodies are rejected
    /// with 413, never truncated.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// Read at most one snapshot body at a time (default: false).
    /// Bounds peak memory on small hosts at the cost of upload throughput.
    #[serde(default)]
    pub serialize_large_payload_reads: bool,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_payload_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_payload_bytes: default_max_payload_bytes(),
            serialize_large_payload_reads: false,
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Payload cap as a `usize`, saturating on 32-bit targets.
    pub fn max_payload_len(&self) -> usize {
        usize::try_from(self.max_payload_bytes).unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_payload_bytes == 0 {
            return Err("server.max_payload_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, SQLite cannot cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/storage.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { path, .. } if path.as_os_str().is_empty() => {
                Err("metadata.path cannot be empty".to_string())
            }
            MetadataConfig::Sqlite { .. } => Ok(()),
        }
    }
}

/// Snapshot retention configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Partial snapshots kept per owner (default: 10).
    #[serde(default = "default_max_partial_snapshots")]
    pub max_partial_snapshots: u32,
    /// Full snapshots kept per owner (default: 1).
    #[serde(default = "default_max_full_snapshots")]
    pub max_full_snapshots: u32,
    /// Seconds between retention sweeps (default: 3600).
    /// Zero or negative disables the sweep; positive values below 60 are raised to 60.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: i64,
    /// Snapshots older than this many seconds are removed (default: 86400).
    #[serde(default = "default_max_snapshot_age_secs")]
    pub max_snapshot_age_secs: u64,
    /// Remove owners with no snapshots that have not been seen for
    /// `idle_owner_grace_secs` (default: true).
    #[serde(default = "default_delete_empty_owners")]
    pub delete_empty_owners: bool,
    /// Grace period before an empty owner is removed (default: 30 days).
    #[serde(default = "default_idle_owner_grace_secs")]
    pub idle_owner_grace_secs: u64,
}

fn default_max_partial_snapshots() -> u32 {
    10
}

fn default_max_full_snapshots() -> u32 {
    1
}

fn default_cleanup_interval_secs() -> i64 {
    3600
}

fn default_max_snapshot_age_secs() -> u64 {
    86400
}

fn default_delete_empty_owners() -> bool {
    true
}

fn default_idle_owner_grace_secs() -> u64 {
    30 * 24 * 3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_partial_snapshots: default_max_partial_snapshots(),
            max_full_snapshots: default_max_full_snapshots(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_snapshot_age_secs: default_max_snapshot_age_secs(),
            delete_empty_owners: default_delete_empty_owners(),
            idle_owner_grace_secs: default_idle_owner_grace_secs(),
        }
    }
}

impl RetentionConfig {
    /// Effective sweep interval, or `None` when sweeping is disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        if self.cleanup_interval_secs <= 0 {
            return None;
        }
        let secs = self.cleanup_interval_secs.max(MIN_CLEANUP_INTERVAL_SECS);
        Some(Duration::from_secs(secs.unsigned_abs()))
    }

    /// Maximum snapshot age as a `time::Duration`.
    pub fn max_snapshot_age(&self) -> time::Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.max_snapshot_age_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }

    /// Idle owner grace period as a `time::Duration`.
    pub fn idle_owner_grace(&self) -> time::Duration {
        let secs = i64::try_from(self.idle_owner_grace_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }
}

/// Client distribution files served under `/exporter`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Archive containing the current client build.
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
    /// Text file holding the current client version string.
    #[serde(default)]
    pub version_path: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Retention configuration.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Client distribution configuration.
    #[serde(default)]
    pub exporter: ExporterConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Retention is disabled so tests drive sweeps explicitly.
    pub fn for_testing() -> Self {
        Self {
            retention: RetentionConfig {
                cleanup_interval_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.metadata.validate()?;
        Ok(())
    }
}
