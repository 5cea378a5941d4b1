//! HTTP server for calsnap.
//!
//! This crate provides:
//! - Owner reservation and authentication
//! - Snapshot upload, listing and download endpoints
//! - The retention engine and its background scheduler
//! - Client distribution endpoints

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod payload;
pub mod retention;
pub mod routes;
pub mod state;

pub use auth::{OwnerAuthenticator, TraceId};
pub use error::ApiError;
pub use payload::PayloadGate;
pub use retention::{RetentionEngine, RetentionPolicy, SweepStats, spawn_retention_task};
pub use routes::create_router;
pub use state::AppState;
