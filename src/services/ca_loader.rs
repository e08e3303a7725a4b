//! CA material loader
//!
//! Reads the signer CA from its fixed secret location on every call. There is
//! no cache: a rotated secret is picked up by the next reconciliation.

use std::sync::Arc;

use tracing::debug;

use crate::models::CaMaterial;
use crate::services::store::SecretStore;
use crate::utils::error::StoreResult;

/// Loads CA material from `<namespace>/<name>`
#[derive(Clone)]
pub struct CaLoader {
    secrets: Arc<dyn SecretStore>,
    namespace: String,
    name: String,
}

impl CaLoader {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Secret location as `namespace/name`
    pub fn location(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Read the CA certificate and key bytes. Store errors are returned as-is.
    pub async fn load(&self) -> StoreResult<CaMaterial> {
        let secret = self.secrets.get(&self.namespace, &self.name).await?;
        debug!("Loaded CA material from secret {}", self.location());
        Ok(CaMaterial::from(&secret))
    }
}

impl std::fmt::Debug for CaLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaLoader")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish()
    }
}
