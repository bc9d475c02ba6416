use mesh_pod_sync_k8s_index::{Change, SyncError};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct ReconcileMetrics {
    reconciles: Family<ChangeLabels, Counter>,
    errors: Family<ErrorLabels, Counter>,
    duration: Histogram,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ChangeLabels {
    change: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ErrorLabels {
    kind: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::<ChangeLabels, Counter>::default();
        reg.register(
            "reconciles",
            "Total number of successful reconciles by resulting change",
            reconciles.clone(),
        );

        let errors = Family::<ErrorLabels, Counter>::default();
        reg.register(
            "reconcile_errors",
            "Total number of failed reconciles by error kind",
            errors.clone(),
        );

        // Reconciles only block on pod fetches.
        let duration = Histogram::new([0.001, 0.01, 0.1, 1.0, 10.0]);
        reg.register_with_unit(
            "reconcile_duration",
            "Histogram of reconcile latency (seconds)",
            Unit::Seconds,
            duration.clone(),
        );

        Self {
            reconciles,
            errors,
            duration,
        }
    }

    pub(crate) fn observe(&self, start: time::Instant, result: &Result<Change, SyncError>) {
        self.duration
            .observe(time::Instant::now().saturating_duration_since(start).as_secs_f64());
        match result {
            Ok(change) => {
                self.reconciles
                    .get_or_create(&ChangeLabels {
                        change: change.as_str(),
                    })
                    .inc();
            }
            Err(error) => {
                self.errors
                    .get_or_create(&ErrorLabels { kind: error.kind() })
                    .inc();
            }
        }
    }
}
