//! Core domain types and shared logic for calsnap.
//!
//! This crate defines the data model shared by the server and the client:
//! - Owner credentials (name + pre-hashed passphrase)
//! - Snapshot kinds, time windows and the wire listing record
//! - Relative time-window expressions (`now-1w2d`)
//! - Client-side passphrase hashing
//! - Configuration types

pub mod config;
pub mod error;
pub mod owner;
pub mod passphrase;
pub mod snapshot;
pub mod timespec;

pub use error::{Error, Result};
pub use owner::{OwnerName, PassphraseHash};
pub use passphrase::{HashParams, PassphraseHasher};
pub use snapshot::{SnapshotId, SnapshotInfo, SnapshotKind, SnapshotWindow};
pub use timespec::{RelativeTimeResolver, WINDOW_MAX, WINDOW_MIN, parse_datetime};
