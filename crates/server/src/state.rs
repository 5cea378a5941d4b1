//! Application state shared across handlers.

use crate::auth::OwnerAuthenticator;
use crate::payload::PayloadGate;
use crate::retention::{RetentionEngine, RetentionPolicy};
use calsnap_core::config::AppConfig;
use calsnap_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Duration;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Owner reservation and authentication.
    pub authenticator: Arc<OwnerAuthenticator>,
    /// Snapshot body reader.
    pub payload_gate: PayloadGate,
}

impl AppState {
    /// Create a new application state, rejecting invalid configuration.
    pub fn new(config: AppConfig, metadata: Arc<dyn MetadataStore>) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let payload_gate = PayloadGate::from_config(&config.server);
        let authenticator = Arc::new(OwnerAuthenticator::new(metadata.clone()));

        Ok(Self {
            config: Arc::new(config),
            metadata,
            authenticator,
            payload_gate,
        })
    }

    /// Build a retention engine over this state's store.
    pub fn retention_engine(&self) -> RetentionEngine {
        RetentionEngine::new(
            self.metadata.clone(),
            RetentionPolicy::from_config(&self.config.retention),
        )
    }

    /// Sweep interval, or `None` when retention is disabled.
    pub fn retention_interval(&self) -> Option<Duration> {
        self.config.retention.cleanup_interval()
    }
}
