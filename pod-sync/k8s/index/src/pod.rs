use crate::SyncError;
use mesh_pod_sync_core::{PodRef, TrackedPod, Uid};
use mesh_pod_sync_k8s_api as k8s;

/// Captures the state of a fetched pod.
///
/// The trigger's reference is used when the pod's metadata omits its namespace or name.
pub fn tracked_pod(reference: &PodRef, pod: k8s::Pod) -> Result<TrackedPod, SyncError> {
    let k8s::Pod {
        metadata, status, ..
    } = pod;

    let uid = metadata
        .uid
        .filter(|uid| !uid.is_empty())
        .map(Uid::from)
        .ok_or_else(|| SyncError::MissingUid(reference.clone()))?;

    let reference = PodRef {
        namespace: metadata
            .namespace
            .unwrap_or_else(|| reference.namespace.clone()),
        name: metadata.name.unwrap_or_else(|| reference.name.clone()),
    };

    let (phase, pod_ip) = status
        .map(|s| (s.phase, s.pod_ip.filter(|ip| !ip.is_empty())))
        .unwrap_or_default();

    Ok(TrackedPod {
        uid,
        reference,
        phase,
        pod_ip,
        labels: metadata.labels.unwrap_or_default(),
        deleting: metadata.deletion_timestamp.is_some(),
    })
}
