use crate::{ClusterState, ConduitError, ConduitRegistry};
use mesh_pod_sync_core::{ConduitPairRx, PodRef, Snapshot, TrackedPod, Uid};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds the synchronized pods and their conduits.
///
/// The two are always updated together so that a pod is tracked if and only if it has an open
/// conduit pair.
#[derive(Debug, Default)]
pub struct Index {
    state: ClusterState,
    conduits: ConduitRegistry,
}

/// Describes how [`Index::apply`] changed the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The pod was not tracked; it was inserted and its conduits were opened.
    Inserted,

    /// The pod was already tracked and its state was replaced.
    Updated,

    /// Another pod with the same namespace and name was tracked under a different UID. It was
    /// removed before the new pod was inserted.
    Replaced { stale: Uid },
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Inserts or updates an eligible pod.
    #[instrument(skip(self, pod), fields(pod = %pod.reference, uid = %pod.uid))]
    pub fn apply(&mut self, pod: TrackedPod) -> Result<Applied, ConduitError> {
        let stale = self.evict_stale(&pod);

        let uid = pod.uid.clone();
        if !self.state.upsert(pod) {
            debug!("Updated pod");
            return Ok(Applied::Updated);
        }

        self.conduits.open(uid)?;
        debug!("Added pod");
        Ok(match stale {
            Some(stale) => Applied::Replaced { stale },
            None => Applied::Inserted,
        })
    }

    /// Removes a pod and closes its conduits, returning false if it was not tracked.
    #[instrument(skip(self))]
    pub fn delete(&mut self, uid: &Uid) -> bool {
        if !self.state.remove(uid) {
            return false;
        }
        self.conduits.close(uid);
        debug!("Removed pod");
        true
    }

    /// Removes a pod tracked under the same namespace and name as `pod` but with a different UID.
    ///
    /// A pod may be recreated under the same name before the old pod's deletion is observed.
    pub fn evict_stale(&mut self, pod: &TrackedPod) -> Option<Uid> {
        let stale = self
            .state
            .find(&pod.reference)
            .filter(|p| p.uid != pod.uid)?
            .uid
            .clone();
        debug!(%stale, uid = %pod.uid, "Evicting stale pod");
        self.delete(&stale);
        Some(stale)
    }

    /// Removes the pod tracked under the given namespace and name, if any.
    pub fn delete_ref(&mut self, reference: &PodRef) -> Option<Uid> {
        let uid = self.state.find(reference)?.uid.clone();
        self.delete(&uid);
        Some(uid)
    }

    pub fn is_tracked(&self, uid: &Uid) -> bool {
        self.state.contains(uid)
    }

    pub fn tracked_refs(&self) -> Vec<PodRef> {
        self.state.refs().cloned().collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn watch_pod(&self, uid: &Uid) -> Option<ConduitPairRx> {
        self.conduits.subscribe(uid)
    }

    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    pub fn conduits(&self) -> &ConduitRegistry {
        &self.conduits
    }
}
