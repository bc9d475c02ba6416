//! A work queue of reconcile triggers.
//!
//! The queue guarantees that a pod is never handed to more than one worker at a time: a pod that
//! is added while it is being processed is held back until the worker calls [`Queue::done`], and a
//! pod that is added several times before a worker picks it up is processed once.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use mesh_pod_sync_core::PodRef;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tokio::{sync::Notify, time};

#[derive(Clone, Debug)]
pub struct Queue {
    shared: Arc<Shared>,
}

/// Bounds the delay before a failed pod is retried.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub min: time::Duration,
    pub max: time::Duration,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
    backoff: Backoff,
}

#[derive(Debug, Default)]
struct State {
    /// Pods waiting for a worker, in trigger order.
    queue: VecDeque<PodRef>,

    /// Pods that need to be processed, whether or not they are queued.
    dirty: HashSet<PodRef>,

    /// Pods currently held by a worker.
    processing: HashSet<PodRef>,

    /// Consecutive failures by pod.
    failures: HashMap<PodRef, u32>,

    shutdown: bool,
}

// === impl Queue ===

impl Queue {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    pub fn add(&self, pod: PodRef) {
        let mut state = self.shared.state.lock();
        if state.shutdown || state.dirty.contains(&pod) {
            return;
        }
        state.dirty.insert(pod.clone());
        if state.processing.contains(&pod) {
            // Requeued by `done`.
            return;
        }
        state.queue.push_back(pod);
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Adds the pod once the delay elapses.
    pub fn add_after(&self, pod: PodRef, delay: time::Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            queue.add(pod);
        });
    }

    /// Waits for a pod to process. Returns `None` once the queue is shut down.
    ///
    /// Every pod returned must be passed to [`Queue::done`] when processing completes.
    pub async fn next(&self) -> Option<PodRef> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if state.shutdown {
                    return None;
                }
                if let Some(pod) = state.queue.pop_front() {
                    state.dirty.remove(&pod);
                    state.processing.insert(pod.clone());
                    if !state.queue.is_empty() {
                        self.shared.notify.notify_one();
                    }
                    return Some(pod);
                }
            }

            notified.await;
        }
    }

    /// Releases a pod returned by [`Queue::next`], requeuing it if it was added in the meantime.
    pub fn done(&self, pod: &PodRef) {
        let mut state = self.shared.state.lock();
        state.processing.remove(pod);
        if state.shutdown || !state.dirty.contains(pod) {
            return;
        }
        state.queue.push_back(pod.clone());
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Records a failure and schedules the pod to be retried, returning the retry delay.
    pub fn retry(&self, pod: PodRef) -> time::Duration {
        let failures = {
            let mut state = self.shared.state.lock();
            let failures = state.failures.entry(pod.clone()).or_default();
            *failures = failures.saturating_add(1);
            *failures
        };
        let delay = self.shared.backoff.delay(failures);
        self.add_after(pod, delay);
        delay
    }

    /// Clears the pod's failure history.
    pub fn forget(&self, pod: &PodRef) {
        self.shared.state.lock().failures.remove(pod);
    }

    pub fn failures(&self, pod: &PodRef) -> u32 {
        self.shared
            .state
            .lock()
            .failures
            .get(pod)
            .copied()
            .unwrap_or(0)
    }

    /// Drops all waiting pods and wakes idle workers so that they exit.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.queue.clear();
            state.dirty.clear();
        }
        self.shared.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// The number of pods waiting for a worker.
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// === impl Backoff ===

impl Backoff {
    /// Doubles from `min` with each consecutive failure, up to `max`.
    pub fn delay(&self, failures: u32) -> time::Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.min
            .checked_mul(1 << exp)
            .map(|d| d.min(self.max))
            .unwrap_or(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: time::Duration::from_millis(5),
            max: time::Duration::from_secs(1000),
        }
    }
}
