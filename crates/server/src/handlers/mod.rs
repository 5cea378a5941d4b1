//! HTTP request handlers.

pub mod calendar;
pub mod exporter;
pub mod health;

pub use calendar::*;
pub use exporter::*;
pub use health::*;
