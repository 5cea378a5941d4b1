//! Client side of calsnap: captures calendar snapshots and pushes them to a
//! calsnap server.

pub mod api_client;
pub mod config;
pub mod credentials;
pub mod last_run;
pub mod payload;
pub mod sync;

pub use api_client::{ApiClient, OwnerCredentials, SnapshotTransport, TransportError};
pub use config::{ClientConfig, client_config_path, load_client_config};
pub use credentials::{PassphraseInput, owner_credentials};
pub use last_run::LastRunTracker;
pub use payload::{CommandPayload, FilePayload, PayloadError, PayloadRequest, PayloadSource};
pub use sync::{SyncError, SyncMode, SyncOrchestrator, SyncReport};
