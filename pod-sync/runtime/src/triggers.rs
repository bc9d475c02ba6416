use crate::queue::Queue;
use futures::prelude::*;
use mesh_pod_sync_core::PodRef;
use mesh_pod_sync_k8s_api::{self as k8s, reflector, watcher};
use mesh_pod_sync_k8s_index::SharedIndex;
use tracing::{debug, trace};

/// Turns pod watch events into reconcile triggers.
///
/// When the watch (re)starts, triggers are held until the initial listing completes so that
/// reconciles never observe a partially populated cache. At that point every tracked pod is
/// triggered as well, since deletions that occurred while the watch was disconnected are not
/// reported as events.
pub struct Triggers {
    queue: Queue,
    index: SharedIndex,
    cache: Option<reflector::store::Writer<k8s::Pod>>,
    initializing: Option<Vec<PodRef>>,
}

// === impl Triggers ===

impl Triggers {
    pub fn new(
        queue: Queue,
        index: SharedIndex,
        cache: Option<reflector::store::Writer<k8s::Pod>>,
    ) -> Self {
        Self {
            queue,
            index,
            cache,
            initializing: None,
        }
    }

    pub async fn run(mut self, events: impl Stream<Item = watcher::Event<k8s::Pod>>) {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            self.handle(event);
        }
        debug!("Pod watch terminated");
    }

    pub fn handle(&mut self, event: watcher::Event<k8s::Pod>) {
        if let Some(cache) = self.cache.as_mut() {
            cache.apply_watcher_event(&event);
        }

        match event {
            watcher::Event::Init => {
                debug!("Listing pods");
                self.initializing = Some(Vec::new());
            }
            watcher::Event::InitApply(pod) => {
                let Some(pod) = pod_ref(&pod) else { return };
                match self.initializing.as_mut() {
                    Some(pending) => pending.push(pod),
                    None => self.queue.add(pod),
                }
            }
            watcher::Event::InitDone => {
                let listed = self.initializing.take().unwrap_or_default();
                let tracked = self.index.read().tracked_refs();
                debug!(
                    listed = listed.len(),
                    tracked = tracked.len(),
                    "Pods listed"
                );
                for pod in listed.into_iter().chain(tracked) {
                    self.queue.add(pod);
                }
            }
            watcher::Event::Apply(pod) | watcher::Event::Delete(pod) => {
                if let Some(pod) = pod_ref(&pod) {
                    trace!(%pod, "Triggered");
                    self.queue.add(pod);
                }
            }
        }
    }
}

fn pod_ref(pod: &k8s::Pod) -> Option<PodRef> {
    let ns = pod.metadata.namespace.as_deref()?;
    let name = pod.metadata.name.as_deref()?;
    Some(PodRef::new(ns, name))
}
