//! Error types and handling
//!
//! This module provides the error taxonomy for the signer. Store and
//! reconciliation errors are transient and retried by the work queue; PEM and
//! issuance errors are permanent for a request and get recorded as conditions
//! on it instead of being returned.

use thiserror::Error;

/// Errors returned by the object and secret stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist (404)
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },

    /// Write based on a stale resource version (409)
    #[error("conflict updating {kind} \"{name}\": object has been modified")]
    Conflict { kind: &'static str, name: String },

    /// Object name rejected before touching the backend
    #[error("invalid object name: {0}")]
    InvalidName(String),

    /// Backend I/O failure
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored object could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true when the error means the object is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// PEM decoding errors
#[derive(Debug, Error)]
pub enum PemError {
    #[error("no PEM data found")]
    Empty,

    #[error("malformed PEM data: {0}")]
    Malformed(String),

    #[error("expected a single {expected} PEM block, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("expected a single {expected} PEM block, found {count}")]
    MultipleBlocks { expected: &'static str, count: usize },

    /// PEM framing was fine but the DER payload is unusable
    #[error("invalid {kind}: {reason}")]
    InvalidContent { kind: &'static str, reason: String },
}

/// Certificate building and signing errors
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("unable to use CA certificate as issuer: {0}")]
    Issuer(String),

    #[error("certificate validity out of range: {0}")]
    Validity(String),

    #[error("unable to sign certificate: {0}")]
    Signing(String),

    #[error("signed certificate does not verify against the CA: {0}")]
    Verification(String),

    #[error("unable to encode certificate: {0}")]
    Encoding(String),
}

/// Transient reconciliation failures, retried by the work queue
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unable to fetch certificate signing request: {0}")]
    Fetch(#[source] StoreError),

    #[error("unable to approve certificate signing request: {0}")]
    Approval(#[source] StoreError),

    #[error("could not get CA certificate and key: {0}")]
    CaUnavailable(#[source] StoreError),

    #[error("unable to update signed certificate: {0}")]
    Persist(#[source] StoreError),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
