//! Snapshot store abstraction and SQLite implementation for calsnap.
//!
//! This crate owns the persisted data model:
//! - Owners (unique name, passphrase hash, last-seen time)
//! - Snapshots (full or partial, with an optional modification window)
//! - Blobs (one opaque payload per snapshot, removed with it)

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use calsnap_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
