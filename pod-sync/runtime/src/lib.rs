#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use mesh_pod_sync_core as core;
pub use mesh_pod_sync_k8s_api as k8s;
pub use mesh_pod_sync_k8s_index as index;

mod args;
mod fetch;
mod metrics;
mod queue;
mod triggers;
mod worker;

pub use self::{
    args::Args,
    fetch::{ApiFetch, CachedFetch},
    metrics::ReconcileMetrics,
    queue::{Backoff, Queue},
    triggers::Triggers,
};

/// Serves the discovery layer from the shared index.
#[derive(Clone, Debug)]
pub struct ClusterDiscover(index::SharedIndex);

impl ClusterDiscover {
    pub fn new(index: index::SharedIndex) -> Self {
        Self(index)
    }
}

impl core::DiscoverClusterState for ClusterDiscover {
    fn snapshot(&self) -> core::Snapshot {
        self.0.read().snapshot()
    }

    fn watch_snapshot(&self) -> core::SnapshotStream {
        let rx = self.0.read().watch_snapshot();
        Box::pin(tokio_stream::wrappers::WatchStream::new(rx))
    }

    fn watch_pod(&self, uid: &core::Uid) -> Option<core::ConduitPairRx> {
        self.0.read().watch_pod(uid)
    }
}
