//! Repository traits for metadata operations.

pub mod owners;
pub mod snapshots;

pub use owners::OwnerRepo;
pub use snapshots::{NewSnapshot, SnapshotRepo};
