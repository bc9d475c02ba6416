use mesh_pod_sync_core::{PodRef, Snapshot, TrackedPod, Uid};
use tokio::sync::watch;

/// The ordered set of synchronized pods, unique by UID.
///
/// Pods are kept in insertion order. Updates replace a pod in place and removals preserve the
/// order of the remaining pods, so consecutive snapshots differ only where the cluster changed.
///
/// Every mutation publishes a new [`Snapshot`] to subscribers.
#[derive(Debug)]
pub struct ClusterState {
    pods: Vec<TrackedPod>,
    snapshot_tx: watch::Sender<Snapshot>,
}

// === impl ClusterState ===

impl Default for ClusterState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterState {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::from(Vec::new()));
        Self {
            pods: Vec::new(),
            snapshot_tx,
        }
    }

    /// Inserts or replaces a pod, returning true if its UID was not already present.
    pub fn upsert(&mut self, pod: TrackedPod) -> bool {
        match self.position(&pod.uid) {
            Some(i) => {
                if self.pods[i] == pod {
                    return false;
                }
                self.pods[i] = pod;
                self.publish();
                false
            }
            None => {
                self.pods.push(pod);
                self.publish();
                true
            }
        }
    }

    /// Removes a pod, returning false if it was not present.
    pub fn remove(&mut self, uid: &Uid) -> bool {
        match self.position(uid) {
            Some(i) => {
                self.pods.remove(i);
                self.publish();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, uid: &Uid) -> Option<&TrackedPod> {
        self.pods.iter().find(|p| p.uid == *uid)
    }

    pub fn contains(&self, uid: &Uid) -> bool {
        self.position(uid).is_some()
    }

    /// Finds the tracked pod with the given namespace and name.
    pub fn find(&self, reference: &PodRef) -> Option<&TrackedPod> {
        self.pods.iter().find(|p| p.reference == *reference)
    }

    pub fn refs(&self) -> impl Iterator<Item = &PodRef> + '_ {
        self.pods.iter().map(|p| &p.reference)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedPod> + '_ {
        self.pods.iter()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    fn position(&self, uid: &Uid) -> Option<usize> {
        self.pods.iter().position(|p| p.uid == *uid)
    }

    fn publish(&self) {
        let snapshot = self.pods.iter().cloned().collect::<Snapshot>();
        self.snapshot_tx.send_replace(snapshot);
    }
}
