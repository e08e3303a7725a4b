//! Deduplicating work queue of request names
//!
//! Guarantees:
//! - a name is queued at most once, however often it is added;
//! - a name handed to a worker is not handed out again until the worker calls
//!   [`WorkQueue::done`]; adds made meanwhile are replayed after `done`;
//! - failed names can be re-added after a per-name exponential backoff.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::debug;

use crate::services::backoff::ExponentialBackoff;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<String>,
    /// Names waiting to be processed (queued, or re-added while processing)
    dirty: HashSet<String>,
    processing: HashSet<String>,
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: ExponentialBackoff,
}

impl WorkQueue {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `name` for processing
    pub fn add(&self, name: &str) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(name) {
            return;
        }
        state.dirty.insert(name.to_string());
        if state.processing.contains(name) {
            return;
        }
        state.queue.push_back(name.to_string());
        drop(state);
        self.notify.notify_one();
    }

    /// Re-add `name` after its backoff delay, counting one more failure
    pub fn add_rate_limited(self: &Arc<Self>, name: &str) {
        let failures = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            let failures = state.failures.entry(name.to_string()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };

        let delay = self.backoff.delay(failures);
        debug!(
            "Requeueing {} in {:?} after {} failure(s)",
            name, delay, failures
        );

        let queue = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&name);
        });
    }

    /// Reset the failure count of `name`
    pub fn forget(&self, name: &str) {
        self.lock().failures.remove(name);
    }

    /// Number of recorded failures for `name`
    pub fn failures(&self, name: &str) -> u32 {
        self.lock().failures.get(name).copied().unwrap_or(0)
    }

    /// Wait for the next name. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(name) = state.queue.pop_front() {
                    state.dirty.remove(&name);
                    state.processing.insert(name.clone());
                    return Some(name);
                }
            }

            notified.await;
        }
    }

    /// Mark `name` finished; replays it if it was added while processing
    pub fn done(&self, name: &str) {
        let mut state = self.lock();
        state.processing.remove(name);
        if state.dirty.contains(name) && !state.shutting_down {
            state.queue.push_back(name.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Number of names waiting to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out work and wake every waiting worker
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(ExponentialBackoff::default())
    }
}
