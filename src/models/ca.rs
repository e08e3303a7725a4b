//! CA secret and CA material models

use std::collections::BTreeMap;

/// Secret data key holding the PEM CA certificate
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret data key holding the PEM CA private key
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// A namespaced bag of opaque byte values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secret {
    pub namespace: String,
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    /// Value stored under `key`, empty when absent
    pub fn value(&self, key: &str) -> &[u8] {
        self.data.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Undecoded CA certificate and private key as read from the secret
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CaMaterial {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
}

impl From<&Secret> for CaMaterial {
    fn from(secret: &Secret) -> Self {
        Self {
            certificate: secret.value(TLS_CERT_KEY).to_vec(),
            key: secret.value(TLS_PRIVATE_KEY_KEY).to_vec(),
        }
    }
}

// Keep key bytes out of logs.
impl std::fmt::Debug for CaMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaMaterial")
            .field("certificate_len", &self.certificate.len())
            .field("key", &"<redacted>")
            .finish()
    }
}
