use crate::{
    core::{Membership, POD_SYNC_CONTROLLER_NAME},
    fetch::{ApiFetch, CachedFetch},
    index::{self, FetchPod, Synchronizer},
    k8s::{self, reflector, watcher},
    metrics::ReconcileMetrics,
    queue::{Backoff, Queue},
    triggers::Triggers,
    worker,
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::future;
use prometheus_client::registry::Registry;
use std::{num::NonZeroUsize, sync::Arc};
use tokio::{task::JoinHandle, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "pod-sync", about = "Synchronizes mesh pods for the discovery layer")]
pub struct Args {
    #[clap(
        long,
        default_value = "mesh_pod_sync=info,warn",
        env = "POD_SYNC_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The label that selects synchronized pods.
    #[clap(long, default_value = "app")]
    membership_label_key: String,

    /// Values of the membership label that make a pod eligible.
    #[clap(long, default_value = "envoy-ingress,worker", value_delimiter = ',')]
    membership_label_values: Vec<String>,

    /// The number of pods that may be reconciled concurrently.
    #[clap(long, default_value = "4")]
    workers: NonZeroUsize,

    #[clap(long, default_value = "5")]
    retry_backoff_min_ms: u64,

    #[clap(long, default_value = "1000000")]
    retry_backoff_max_ms: u64,

    /// Reads pods from the API server on each reconcile instead of from the watch cache.
    #[clap(long)]
    uncached_reads: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let membership = Arc::new(self.membership());
        let backoff = self.backoff()?;
        let Self {
            admin,
            client,
            log_level,
            log_format,
            workers,
            uncached_reads,
            ..
        } = self;

        let index = index::Index::shared();

        let mut prom = <Registry>::default();
        index::metrics::register(prom.sub_registry_with_prefix("pod_index"), index.clone());
        let reconcile_metrics =
            ReconcileMetrics::register(prom.sub_registry_with_prefix("pod_sync"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        info!(
            controller = POD_SYNC_CONTROLLER_NAME,
            label = membership.label_key(),
            values = ?membership.allowed_values().collect::<Vec<_>>(),
            %workers,
            uncached_reads,
            "Synchronizing pods"
        );

        let queue = Queue::new(backoff);

        // Every pod event triggers a reconcile, so the watch is not filtered by label: a pod that
        // loses its label must still be observed.
        let pods = runtime.watch_all::<k8s::Pod>(watcher::Config::default());
        let handles = if uncached_reads {
            tokio::spawn(
                Triggers::new(queue.clone(), index.clone(), None)
                    .run(pods)
                    .instrument(info_span!("pods")),
            );
            let fetch = ApiFetch::new(runtime.client());
            spawn_workers(
                workers,
                &queue,
                Synchronizer::new(index, membership, fetch),
                &reconcile_metrics,
            )
        } else {
            let cache = reflector::store::Writer::<k8s::Pod>::default();
            let fetch = CachedFetch::new(cache.as_reader());
            tokio::spawn(
                Triggers::new(queue.clone(), index.clone(), Some(cache))
                    .run(pods)
                    .instrument(info_span!("pods")),
            );
            spawn_workers(
                workers,
                &queue,
                Synchronizer::new(index, membership, fetch),
                &reconcile_metrics,
            )
        };

        // Stop handing out pods once shutdown begins, but let in-flight reconciles complete.
        let shutdown = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                let release = shutdown.signaled().await;
                info!("Draining workers");
                queue.shutdown();
                release.release_after(future::join_all(handles)).await;
            }
            .instrument(info_span!("shutdown")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    fn membership(&self) -> Membership {
        Membership::new(&self.membership_label_key, &self.membership_label_values)
    }

    fn backoff(&self) -> Result<Backoff> {
        let backoff = Backoff {
            min: Duration::from_millis(self.retry_backoff_min_ms),
            max: Duration::from_millis(self.retry_backoff_max_ms),
        };
        if backoff.min.is_zero() || backoff.min > backoff.max {
            bail!(
                "invalid retry backoff: {}ms..{}ms",
                self.retry_backoff_min_ms,
                self.retry_backoff_max_ms
            );
        }
        Ok(backoff)
    }
}

fn spawn_workers<F>(
    workers: NonZeroUsize,
    queue: &Queue,
    sync: Synchronizer<F>,
    metrics: &ReconcileMetrics,
) -> Vec<JoinHandle<()>>
where
    F: FetchPod + Clone + Send + Sync + 'static,
{
    (0..workers.get())
        .map(|id| {
            tokio::spawn(
                worker::run(queue.clone(), sync.clone(), metrics.clone())
                    .instrument(info_span!("worker", id)),
            )
        })
        .collect()
}
