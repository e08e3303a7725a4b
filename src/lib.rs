//! Peer certificate signer
//!
//! Controller that approves and signs certificate signing requests addressed
//! to a single named signer, using CA material read from a secret.

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use services::{
    CaLoader, Dispatcher, FileStore, HealthReporter, RequestStore, RequestWatcher, SecretStore,
    SignerController, StatusManager, WorkQueue,
};
