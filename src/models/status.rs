//! Aggregate health models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Components reporting into aggregate health
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusComponent {
    CertificateSigner,
}

impl std::fmt::Display for StatusComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusComponent::CertificateSigner => write!(f, "CertificateSigner"),
        }
    }
}

/// Current health of one component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentStatus {
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl ComponentStatus {
    pub fn degraded(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            degraded: true,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self {
            degraded: false,
            reason: String::new(),
            message: String::new(),
            last_transition_time: Utc::now(),
        }
    }

    /// Same state, ignoring the transition time
    pub fn same_state(&self, other: &ComponentStatus) -> bool {
        self.degraded == other.degraded && self.reason == other.reason && self.message == other.message
    }
}
