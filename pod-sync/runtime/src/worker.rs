use crate::{metrics::ReconcileMetrics, queue::Queue};
use mesh_pod_sync_k8s_index::{FetchPod, Synchronizer};
use tokio::time;
use tracing::{debug, info, info_span, Instrument};

/// Reconciles pods from the queue until it is shut down.
pub(crate) async fn run<F>(queue: Queue, sync: Synchronizer<F>, metrics: ReconcileMetrics)
where
    F: FetchPod + Send + Sync + 'static,
{
    while let Some(pod) = queue.next().await {
        let span = info_span!("reconcile", ns = %pod.namespace, name = %pod.name);
        let start = time::Instant::now();
        let result = sync.reconcile(&pod).instrument(span.clone()).await;
        metrics.observe(start, &result);

        match result {
            Ok(change) => {
                debug!(parent: &span, change = change.as_str(), "Reconciled");
                queue.forget(&pod);
            }
            Err(error) => {
                let delay = queue.retry(pod.clone());
                info!(parent: &span, error = ?error, ?delay, "Reconcile failed");
            }
        }
        queue.done(&pod);
    }
    debug!("Queue shut down");
}
