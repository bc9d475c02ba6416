use crate::{tracked_pod, Applied, ConduitError, SharedIndex};
use mesh_pod_sync_core::{Eligibility, Membership, PodRef};
use mesh_pod_sync_k8s_api as k8s;
use std::sync::Arc;
use tracing::{debug, trace};

/// Looks up the current state of a pod.
#[async_trait::async_trait]
pub trait FetchPod {
    /// Returns `None` if the pod does not exist. Errors are transient and the fetch may be
    /// retried.
    async fn fetch(&self, pod: &PodRef) -> anyhow::Result<Option<k8s::Pod>>;
}

/// Reconciles individual pods into a [`SharedIndex`].
#[derive(Clone, Debug)]
pub struct Synchronizer<F> {
    index: SharedIndex,
    membership: Arc<Membership>,
    fetch: F,
}

/// Describes the outcome of a successful reconcile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Inserted,
    Updated,
    /// A pod with a new UID replaced a tracked pod with the same name.
    Replaced,
    Removed,
    /// The pod is not tracked and is not eligible to be.
    Ignored,
    /// The pod does not exist (or is being deleted) and was not tracked.
    Untracked,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to fetch pod {pod}")]
    Fetch { pod: PodRef, source: anyhow::Error },

    #[error("pod {0} has no uid")]
    MissingUid(PodRef),

    #[error(transparent)]
    Conduit(#[from] ConduitError),
}

// === impl Synchronizer ===

impl<F: FetchPod> Synchronizer<F> {
    pub fn new(index: SharedIndex, membership: Arc<Membership>, fetch: F) -> Self {
        Self {
            index,
            membership,
            fetch,
        }
    }

    /// Brings the index in line with the pod's current state.
    ///
    /// Fetch errors leave the index unchanged.
    pub async fn reconcile(&self, reference: &PodRef) -> Result<Change, SyncError> {
        let pod = self
            .fetch
            .fetch(reference)
            .await
            .map_err(|source| SyncError::Fetch {
                pod: reference.clone(),
                source,
            })?;

        let pod = match pod {
            Some(pod) => tracked_pod(reference, pod)?,
            None => {
                return Ok(match self.index.write().delete_ref(reference) {
                    Some(uid) => {
                        debug!(%uid, "Pod no longer exists");
                        Change::Removed
                    }
                    None => {
                        trace!("Untracked pod does not exist");
                        Change::Untracked
                    }
                });
            }
        };

        if pod.deleting {
            let mut index = self.index.write();
            let stale = index.evict_stale(&pod);
            return Ok(if index.delete(&pod.uid) || stale.is_some() {
                debug!(uid = %pod.uid, "Pod is being deleted");
                Change::Removed
            } else {
                trace!(uid = %pod.uid, "Untracked pod is being deleted");
                Change::Untracked
            });
        }

        match self.membership.classify(&pod) {
            Eligibility::Ineligible => {
                // A recreated pod that is not yet eligible still supersedes the pod it replaced.
                if let Some(stale) = self.index.write().evict_stale(&pod) {
                    debug!(%stale, uid = %pod.uid, "Replacement pod is ineligible");
                    return Ok(Change::Removed);
                }
                // Tracked pods that become ineligible are retained until they are deleted.
                trace!(uid = %pod.uid, phase = ?pod.phase, ip = ?pod.pod_ip, "Ignoring ineligible pod");
                Ok(Change::Ignored)
            }
            Eligibility::EligibleRunning => {
                let applied = self.index.write().apply(pod)?;
                Ok(applied.into())
            }
        }
    }
}

// === impl Change ===

impl Change {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Replaced => "replaced",
            Self::Removed => "removed",
            Self::Ignored => "ignored",
            Self::Untracked => "untracked",
        }
    }
}

impl From<Applied> for Change {
    fn from(applied: Applied) -> Self {
        match applied {
            Applied::Inserted => Self::Inserted,
            Applied::Updated => Self::Updated,
            Applied::Replaced { .. } => Self::Replaced,
        }
    }
}

// === impl SyncError ===

impl SyncError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::MissingUid(_) => "missing_uid",
            Self::Conduit(_) => "conduit",
        }
    }
}
