//! Polling watcher for signing request objects
//!
//! Rescans the file store on a fixed interval and enqueues every request whose
//! resource version changed since the previous scan. Creation and every update
//! (approval, failure condition, issued certificate) therefore produce one
//! delivery; the controller is idempotent, so extra deliveries are harmless.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::file_store::FileStore;
use crate::services::workqueue::WorkQueue;
use crate::utils::error::StoreResult;

pub struct RequestWatcher {
    store: Arc<FileStore>,
    queue: Arc<WorkQueue>,
    poll_interval: Duration,
    seen: BTreeMap<String, u64>,
}

impl RequestWatcher {
    pub fn new(store: Arc<FileStore>, queue: Arc<WorkQueue>, poll_interval: Duration) -> Self {
        Self {
            store,
            queue,
            poll_interval,
            seen: BTreeMap::new(),
        }
    }

    /// Poll until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Watching {:?} for certificate signing requests (poll interval: {}s)",
            self.store.requests_dir(),
            self.poll_interval.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.scan().await {
                Ok(0) => {}
                Ok(count) => debug!("Enqueued {} changed request(s)", count),
                Err(e) => warn!("Failed to scan certificate signing requests: {}", e),
            }
        }

        info!("Request watcher stopped");
    }

    /// One scan: enqueue new or changed requests, returning how many
    pub async fn scan(&mut self) -> StoreResult<usize> {
        let current = self.store.list_versions().await?;

        let mut enqueued = 0;
        for (name, version) in &current {
            if self.seen.get(name) != Some(version) {
                self.queue.add(name);
                enqueued += 1;
            }
        }

        self.seen = current;
        Ok(enqueued)
    }
}
