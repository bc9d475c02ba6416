//! Types shared between the pod synchronizer and the discovery layer that consumes it.
//!
//! The synchronizer mirrors a subset of the cluster's pods into an ordered, in-memory
//! collection. Each mirrored pod is paired with a set of [`conduit`]s that the discovery layer
//! subscribes to; closing a pod's conduits tells discovery to stop serving configuration derived
//! from that pod.
//!
//! ```text
//! [ Pod ] --(Membership)--> [ ClusterState ] --> snapshot / watch_snapshot
//!                                 |
//!                                 +--> [ ConduitPair(listeners, clusters) ] --> watch_pod
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod conduit;
pub mod membership;
mod pod;

pub use self::{
    conduit::{Conduit, ConduitPair, ConduitPairRx, ConduitRx, ConduitState},
    membership::{Eligibility, Membership},
    pod::{Labels, PodRef, TrackedPod, Uid},
};
use futures::prelude::*;
use std::{pin::Pin, sync::Arc};

pub const POD_SYNC_CONTROLLER_NAME: &str = "pod-sync";

/// An immutable, ordered view of all tracked pods.
pub type Snapshot = Arc<[TrackedPod]>;

pub type SnapshotStream = Pin<Box<dyn Stream<Item = Snapshot> + Send + Sync + 'static>>;

/// Models the discovery layer's view of synchronized cluster state.
pub trait DiscoverClusterState {
    /// Returns the current set of tracked pods.
    fn snapshot(&self) -> Snapshot;

    /// Streams a new snapshot each time the tracked set changes.
    fn watch_snapshot(&self) -> SnapshotStream;

    /// Subscribes to the conduits of a tracked pod, if it is tracked.
    fn watch_pod(&self, uid: &Uid) -> Option<ConduitPairRx>;
}
