//! Signer services

pub mod approval;
pub mod backoff;
pub mod ca_loader;
pub mod controller;
pub mod dispatcher;
pub mod file_store;
pub mod issuance;
pub mod pem;
pub mod status;
pub mod store;
pub mod watcher;
pub mod workqueue;

pub use approval::{ApprovalDecision, AUTO_APPROVED_REASON};
pub use backoff::ExponentialBackoff;
pub use ca_loader::CaLoader;
pub use controller::{FailureReason, SignerController};
pub use dispatcher::Dispatcher;
pub use file_store::FileStore;
pub use issuance::{CertificateSummary, CertificateTemplate};
pub use status::{HealthReporter, StatusManager};
pub use store::{RequestStore, SecretStore};
pub use watcher::RequestWatcher;
pub use workqueue::WorkQueue;
