//! Pod state synchronization
//!
//! The index mirrors pods that satisfy a [`Membership`] policy into an ordered
//! [`ClusterState`](cluster_state::ClusterState) and maintains a
//! [`ConduitPair`](mesh_pod_sync_core::ConduitPair) for each of them. Both structures live behind a
//! single lock ([`SharedIndex`]) because they are always mutated together: a pod is inserted and
//! its conduits are opened in one step, and it is removed and its conduits are closed in one step.
//!
//! The [`Synchronizer`] drives the index. Each reconcile names a single pod; the synchronizer
//! fetches the pod's current state and then:
//!
//! - removes the pod (closing its conduits) if it no longer exists or is being deleted;
//! - inserts or updates the pod if it is eligible;
//! - otherwise leaves the index untouched.
//!
//! A pod that becomes ineligible while it is tracked (e.g. its label is removed) is retained until
//! it is deleted.
//!
//! Reconciles for distinct pods may run concurrently. Callers must not run more than one reconcile
//! for the same pod at a time.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster_state;
pub mod conduits;
mod index;
pub mod metrics;
mod pod;
mod sync;

#[cfg(test)]
mod tests;

pub use self::{
    cluster_state::ClusterState,
    conduits::{ConduitError, ConduitRegistry},
    index::{Applied, Index, SharedIndex},
    pod::tracked_pod,
    sync::{Change, FetchPod, SyncError, Synchronizer},
};
pub use mesh_pod_sync_core::Membership;
