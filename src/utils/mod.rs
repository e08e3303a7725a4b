//! Shared utilities

pub mod error;
pub mod validation;

pub use error::{IssueError, PemError, ReconcileError, StoreError, StoreResult};
