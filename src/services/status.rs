//! Aggregate health reporting
//!
//! The controller reports systemic faults through [`HealthReporter`]. The
//! [`StatusManager`] keeps the latest state per component in memory, logs
//! transitions and optionally mirrors the whole map to a JSON file for
//! operators and health checks.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info, warn};

use crate::models::{ComponentStatus, StatusComponent};

/// Capability to publish component health
pub trait HealthReporter: Send + Sync {
    fn set_degraded(&self, component: StatusComponent, reason: &str, message: &str);
    fn set_not_degraded(&self, component: StatusComponent);
}

/// In-process aggregate health state
#[derive(Debug, Default)]
pub struct StatusManager {
    components: RwLock<BTreeMap<StatusComponent, ComponentStatus>>,
    status_file: Option<PathBuf>,
}

impl StatusManager {
    pub fn new(status_file: Option<PathBuf>) -> Self {
        Self {
            components: RwLock::new(BTreeMap::new()),
            status_file,
        }
    }

    /// Current status of a component, if it has ever reported
    pub fn get(&self, component: StatusComponent) -> Option<ComponentStatus> {
        self.components
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&component)
            .cloned()
    }

    /// True if any component is degraded
    pub fn is_degraded(&self) -> bool {
        self.components
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .any(|s| s.degraded)
    }

    fn set(&self, component: StatusComponent, status: ComponentStatus) {
        let mut components = self.components.write().unwrap_or_else(|e| e.into_inner());
        if components
            .get(&component)
            .is_some_and(|current| current.same_state(&status))
        {
            return;
        }
        components.insert(component, status);

        // Written under the lock so the file never falls behind memory
        if let Some(ref path) = self.status_file {
            if let Err(e) = blocking(|| write_status_file(path, &components)) {
                error!("Failed to write status file {:?}: {}", path, e);
            }
        }
    }
}

/// Run blocking file I/O without stalling other tasks on a multi-threaded runtime
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl HealthReporter for StatusManager {
    fn set_degraded(&self, component: StatusComponent, reason: &str, message: &str) {
        warn!(component = %component, reason, "Component degraded: {}", message);
        self.set(component, ComponentStatus::degraded(reason, message));
    }

    fn set_not_degraded(&self, component: StatusComponent) {
        if self.get(component).is_some_and(|s| s.degraded) {
            info!(component = %component, "Component no longer degraded");
        }
        self.set(component, ComponentStatus::healthy());
    }
}

fn write_status_file(
    path: &PathBuf,
    snapshot: &BTreeMap<StatusComponent, ComponentStatus>,
) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
