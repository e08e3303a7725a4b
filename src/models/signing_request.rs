//! Certificate signing request models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object metadata shared by stored resources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Unique object name
    pub name: String,
    /// Version used for optimistic concurrency on writes
    #[serde(default)]
    pub resource_version: u64,
    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub creation_timestamp: DateTime<Utc>,
}

/// A request for a certificate from an in-cluster peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningRequest {
    pub metadata: ObjectMeta,
    pub spec: SigningRequestSpec,
    #[serde(default)]
    pub status: SigningRequestStatus,
}

/// Requester-provided part of a signing request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningRequestSpec {
    /// Signer that must handle this request
    pub signer_name: String,
    /// PEM-encoded PKCS#10 certificate request
    #[serde(with = "base64_bytes")]
    pub request: Vec<u8>,
}

/// Signer-owned part of a signing request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningRequestStatus {
    /// Append-only condition history
    #[serde(default)]
    pub conditions: Vec<RequestCondition>,
    /// PEM-encoded issued certificate, empty until issued
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub certificate: Vec<u8>,
}

/// Condition types recorded on a signing request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Approved,
    Denied,
    Failed,
}

/// Condition truth value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    #[default]
    True,
    False,
    Unknown,
}

/// A single typed status entry on a signing request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    #[serde(default)]
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub last_update_time: DateTime<Utc>,
}

impl RequestCondition {
    /// Create a condition with status `True`, stamped with the current time
    pub fn new(type_: ConditionType, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_,
            status: ConditionStatus::True,
            reason: reason.into(),
            message: message.into(),
            last_update_time: Utc::now(),
        }
    }
}

impl SigningRequest {
    /// Create a fresh, unapproved request
    pub fn new(name: impl Into<String>, signer_name: impl Into<String>, request: Vec<u8>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                resource_version: 0,
                creation_timestamp: Utc::now(),
            },
            spec: SigningRequestSpec {
                signer_name: signer_name.into(),
                request,
            },
            status: SigningRequestStatus::default(),
        }
    }

    /// Request name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// True once a certificate has been issued
    pub fn is_issued(&self) -> bool {
        !self.status.certificate.is_empty()
    }

    /// True if any condition of the given type is present
    pub fn has_condition(&self, type_: ConditionType) -> bool {
        self.status.conditions.iter().any(|c| c.type_ == type_)
    }
}

/// Serde adapter storing byte fields as standard base64 strings
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
