//! Directory-backed object store
//!
//! Layout under the root directory:
//!
//! ```text
//! certificatesigningrequests/<name>.json     one SigningRequest per file
//! secrets/<namespace>/<name>/<key>           one file per secret data key
//! ```
//!
//! Writes go to a temporary file and are renamed into place. Status and
//! approval writes are rejected with [`StoreError::Conflict`] when the caller
//! holds a stale `resource_version`. A per-store write lock serializes the
//! read-compare-write sequence within this process.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{Secret, SigningRequest};
use crate::services::store::{RequestStore, SecretStore};
use crate::utils::error::{StoreError, StoreResult};
use crate::utils::validation::{validate_namespace, validate_object_name, validate_secret_key};

const REQUESTS_DIR: &str = "certificatesigningrequests";
const SECRETS_DIR: &str = "secrets";
const REQUEST_KIND: &str = "certificatesigningrequest";
const SECRET_KIND: &str = "secret";

/// Object store rooted at a local directory
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

/// Which part of the status a write may change
#[derive(Debug, Clone, Copy)]
enum StatusWrite {
    /// Conditions and certificate
    Status,
    /// Conditions only
    Approval,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the directory layout if it does not exist
    pub async fn ensure_layout(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(self.requests_dir()).await?;
        tokio::fs::create_dir_all(self.root.join(SECRETS_DIR)).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.root.join(REQUESTS_DIR)
    }

    fn request_path(&self, name: &str) -> StoreResult<PathBuf> {
        if !validate_object_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.requests_dir().join(format!("{}.json", name)))
    }

    /// Create a new request. Fails with `Conflict` if it already exists.
    pub async fn create(&self, request: &SigningRequest) -> StoreResult<SigningRequest> {
        let path = self.request_path(request.name())?;
        let _guard = self.write_lock.lock().await;

        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::Conflict {
                kind: REQUEST_KIND,
                name: request.name().to_string(),
            });
        }

        let mut created = request.clone();
        created.metadata.resource_version = 1;
        write_json_atomic(&path, &created).await?;
        Ok(created)
    }

    /// Names and resource versions of every stored request
    pub async fn list_versions(&self) -> StoreResult<BTreeMap<String, u64>> {
        let mut versions = BTreeMap::new();
        let mut entries = match tokio::fs::read_dir(self.requests_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = request_name_from_path(&path) else {
                continue;
            };
            match read_request(&path, &name).await {
                Ok(request) => {
                    versions.insert(name, request.metadata.resource_version);
                }
                // Deleted between listing and reading
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => debug!("Skipping unreadable request file {:?}: {}", path, e),
            }
        }

        Ok(versions)
    }

    async fn write_status(
        &self,
        request: &SigningRequest,
        write: StatusWrite,
    ) -> StoreResult<SigningRequest> {
        let path = self.request_path(request.name())?;
        let _guard = self.write_lock.lock().await;

        let mut current = read_request(&path, request.name()).await?;
        if current.metadata.resource_version != request.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: REQUEST_KIND,
                name: request.name().to_string(),
            });
        }

        current.status.conditions = request.status.conditions.clone();
        if let StatusWrite::Status = write {
            current.status.certificate = request.status.certificate.clone();
        }
        current.metadata.resource_version += 1;

        write_json_atomic(&path, &current).await?;
        debug!(
            "Updated {:?} of {} to resource version {}",
            write,
            request.name(),
            current.metadata.resource_version
        );
        Ok(current)
    }
}

#[async_trait]
impl RequestStore for FileStore {
    async fn get(&self, name: &str) -> StoreResult<SigningRequest> {
        let path = self.request_path(name)?;
        read_request(&path, name).await
    }

    async fn update_status(&self, request: &SigningRequest) -> StoreResult<()> {
        self.write_status(request, StatusWrite::Status).await?;
        Ok(())
    }

    async fn update_approval(&self, request: &SigningRequest) -> StoreResult<SigningRequest> {
        self.write_status(request, StatusWrite::Approval).await
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<Secret> {
        if !validate_namespace(namespace) {
            return Err(StoreError::InvalidName(namespace.to_string()));
        }
        if !validate_object_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }

        let dir = self.root.join(SECRETS_DIR).join(namespace).join(name);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    kind: SECRET_KIND,
                    name: format!("{}/{}", namespace, name),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut secret = Secret {
            namespace: namespace.to_string(),
            name: name.to_string(),
            data: BTreeMap::new(),
        };
        while let Some(entry) = entries.next_entry().await? {
            // Mounted secrets expose keys as symlinks, so follow them.
            if !tokio::fs::metadata(entry.path()).await?.is_file() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().into_owned();
            if !validate_secret_key(&key) {
                continue;
            }
            let value = tokio::fs::read(entry.path()).await?;
            secret.data.insert(key, value);
        }

        Ok(secret)
    }
}

fn request_name_from_path(path: &Path) -> Option<String> {
    if path.extension()? != "json" {
        return None;
    }
    let name = path.file_stem()?.to_str()?;
    validate_object_name(name).then(|| name.to_string())
}

async fn read_request(path: &Path, name: &str) -> StoreResult<SigningRequest> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                kind: REQUEST_KIND,
                name: name.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

async fn write_json_atomic(path: &Path, request: &SigningRequest) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(request)?;
    let tmp = path.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
