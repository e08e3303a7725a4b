//! Storage collaborator interfaces
//!
//! The controller only talks to storage through these traits. Status and
//! approval are separate writes: approval is a privileged subresource update
//! and must never be folded into an ordinary status update.

use async_trait::async_trait;

use crate::models::{Secret, SigningRequest};
use crate::utils::error::StoreResult;

/// Read-through access to signing request objects
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Fetch the current state of a request. Missing objects yield
    /// `StoreError::NotFound`.
    async fn get(&self, name: &str) -> StoreResult<SigningRequest>;

    /// Write `status.conditions` and `status.certificate`.
    async fn update_status(&self, request: &SigningRequest) -> StoreResult<()>;

    /// Write the approval conditions through the approval subresource and
    /// return the updated object.
    async fn update_approval(&self, request: &SigningRequest) -> StoreResult<SigningRequest>;
}

/// Read access to secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<Secret>;
}
