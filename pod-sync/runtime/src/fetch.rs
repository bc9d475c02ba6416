use mesh_pod_sync_core::PodRef;
use mesh_pod_sync_k8s_api::{self as k8s, reflector};
use mesh_pod_sync_k8s_index::FetchPod;

/// Reads pods from the informer cache maintained by the pod watch.
#[derive(Clone)]
pub struct CachedFetch(reflector::Store<k8s::Pod>);

/// Reads pods directly from the API server.
#[derive(Clone)]
pub struct ApiFetch(k8s::Client);

// === impl CachedFetch ===

impl CachedFetch {
    pub fn new(store: reflector::Store<k8s::Pod>) -> Self {
        Self(store)
    }
}

#[async_trait::async_trait]
impl FetchPod for CachedFetch {
    async fn fetch(&self, pod: &PodRef) -> anyhow::Result<Option<k8s::Pod>> {
        let key = reflector::ObjectRef::new(&pod.name).within(&pod.namespace);
        Ok(self.0.get(&key).map(|pod| (*pod).clone()))
    }
}

// === impl ApiFetch ===

impl ApiFetch {
    pub fn new(client: k8s::Client) -> Self {
        Self(client)
    }
}

#[async_trait::async_trait]
impl FetchPod for ApiFetch {
    async fn fetch(&self, pod: &PodRef) -> anyhow::Result<Option<k8s::Pod>> {
        let api = k8s::Api::<k8s::Pod>::namespaced(self.0.clone(), &pod.namespace);
        Ok(api.get_opt(&pod.name).await?)
    }
}
