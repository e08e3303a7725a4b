//! Worker pool running reconciliations from the work queue
//!
//! Different request names are reconciled concurrently by up to `workers`
//! tasks; the work queue keeps any one name on a single worker at a time.
//! Transient reconcile errors are requeued with backoff, everything else is
//! considered handled.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::controller::SignerController;
use crate::services::workqueue::WorkQueue;

pub struct Dispatcher {
    controller: Arc<SignerController>,
    queue: Arc<WorkQueue>,
    workers: usize,
}

impl Dispatcher {
    pub fn new(controller: Arc<SignerController>, queue: Arc<WorkQueue>, workers: usize) -> Self {
        Self {
            controller,
            queue,
            workers: workers.max(1),
        }
    }

    /// Run workers until `shutdown` is cancelled, then drain in-flight work
    pub async fn run(self, shutdown: CancellationToken) {
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let controller = Arc::clone(&self.controller);
            let queue = Arc::clone(&self.queue);
            workers.spawn(worker_loop(id, controller, queue));
        }
        info!("Started {} signer worker(s)", self.workers);

        shutdown.cancelled().await;
        info!("Stopping signer workers");
        self.queue.shut_down();

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                warn!("Signer worker exited abnormally: {}", e);
            }
        }
        info!("Signer workers stopped");
    }
}

async fn worker_loop(id: usize, controller: Arc<SignerController>, queue: Arc<WorkQueue>) {
    while let Some(name) = queue.get().await {
        debug!(worker = id, "Reconciling {}", name);
        match controller.reconcile(&name).await {
            Ok(()) => queue.forget(&name),
            Err(e) => {
                warn!(worker = id, "Reconcile of {} failed, will retry: {}", name, e);
                queue.add_rate_limited(&name);
            }
        }
        queue.done(&name);
    }
    debug!(worker = id, "Worker exiting");
}
