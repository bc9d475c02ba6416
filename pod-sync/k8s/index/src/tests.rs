use crate::{Change, FetchPod, Index, SharedIndex, SyncError, Synchronizer};
use ahash::AHashMap as HashMap;
use mesh_pod_sync_core::{Membership, PodRef, Uid};
use mesh_pod_sync_k8s_api as k8s;
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn eligible_pod_is_tracked() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));

    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Inserted);

    let index = test.index.read();
    let snapshot = index.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].uid, Uid::from("p1"));
    assert_eq!(snapshot[0].pod_ip.as_deref(), Some("10.0.0.5"));
    let rx = index.watch_pod(&Uid::from("p1")).expect("conduits must exist");
    assert!(!rx.is_closed());
}

#[tokio::test]
async fn deletion_marked_pod_is_removed() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");
    let rx = test
        .index
        .read()
        .watch_pod(&Uid::from("p1"))
        .expect("conduits must exist");

    test.fetch.set(deleting(mk_pod(
        "p1",
        "pod-1",
        "worker",
        "Running",
        "10.0.0.5",
    )));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Removed);

    let index = test.index.read();
    assert!(index.snapshot().is_empty());
    assert!(!index.is_tracked(&Uid::from("p1")));
    assert!(index.watch_pod(&Uid::from("p1")).is_none());
    assert!(rx.listeners.is_closed());
    assert!(rx.clusters.is_closed());
}

#[tokio::test]
async fn unselected_pod_is_ignored() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p2", "pod-2", "other", "Running", "10.0.0.6"));

    let change = test.reconcile("pod-2").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Ignored);

    let index = test.index.read();
    assert!(index.snapshot().is_empty());
    assert!(index.conduits().is_empty());
}

#[tokio::test]
async fn missing_untracked_pod_is_noop() {
    let test = TestConfig::default();
    let change = test.reconcile("pod-3").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Untracked);
    assert!(test.index.read().snapshot().is_empty());
    assert!(test.index.read().conduits().is_empty());
}

#[tokio::test]
async fn missing_tracked_pod_is_removed() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");
    let rx = test
        .index
        .read()
        .watch_pod(&Uid::from("p1"))
        .expect("conduits must exist");

    test.fetch.unset("pod-1");
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Removed);
    assert!(test.index.read().snapshot().is_empty());
    assert!(rx.is_closed());

    // Observing the deletion again does nothing.
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Untracked);
}

#[tokio::test]
async fn repeated_reconciles_are_idempotent() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));

    assert_eq!(
        test.reconcile("pod-1").await.expect("reconcile must succeed"),
        Change::Inserted
    );
    let rx = test
        .index
        .read()
        .watch_pod(&Uid::from("p1"))
        .expect("conduits must exist");

    for _ in 0..3 {
        assert_eq!(
            test.reconcile("pod-1").await.expect("reconcile must succeed"),
            Change::Updated
        );
    }

    let index = test.index.read();
    assert_eq!(index.snapshot().len(), 1);
    assert_eq!(index.conduits().len(), 1);
    // The first conduits were not replaced.
    assert!(!rx.is_closed());
}

#[tokio::test]
async fn address_changes_update_in_place() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p0", "pod-0", "worker", "Running", "10.0.0.4"));
    test.reconcile("pod-0").await.expect("reconcile must succeed");
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");
    let rx = test
        .index
        .read()
        .watch_pod(&Uid::from("p1"))
        .expect("conduits must exist");

    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.9"));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Updated);

    let snapshot = test.index.read().snapshot();
    assert_eq!(
        snapshot
            .iter()
            .map(|p| (p.uid.as_str(), p.pod_ip.as_deref()))
            .collect::<Vec<_>>(),
        [("p0", Some("10.0.0.4")), ("p1", Some("10.0.0.9"))]
    );
    assert!(!rx.is_closed());
}

#[tokio::test]
async fn ineligible_pods_are_never_tracked() {
    let test = TestConfig::default();
    let pods = [
        mk_pod("p1", "pod-1", "worker", "Pending", "10.0.0.5"),
        mk_pod("p1", "pod-1", "worker", "Running", ""),
        mk_pod("p1", "pod-1", "other", "Running", "10.0.0.5"),
        unlabeled(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5")),
    ];
    for pod in pods {
        test.fetch.set(pod);
        for _ in 0..2 {
            let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
            assert_eq!(change, Change::Ignored);
        }
    }
    assert!(test.index.read().snapshot().is_empty());
    assert!(test.index.read().conduits().is_empty());
}

#[tokio::test]
async fn tracked_pods_remain_when_ineligible() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");

    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Succeeded", "10.0.0.5"));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Ignored);

    let index = test.index.read();
    let snapshot = index.snapshot();
    assert_eq!(snapshot.len(), 1);
    // The last eligible state is retained.
    assert_eq!(snapshot[0].phase.as_deref(), Some("Running"));
    assert!(index.conduits().is_open(&Uid::from("p1")));
}

#[tokio::test]
async fn deletion_of_untracked_pod_is_noop() {
    let test = TestConfig::default();
    test.fetch.set(deleting(mk_pod(
        "p1",
        "pod-1",
        "other",
        "Running",
        "10.0.0.5",
    )));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Untracked);
    assert!(test.index.read().conduits().is_empty());
}

#[tokio::test]
async fn recreated_pod_replaces_stale_uid() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");
    let stale = test
        .index
        .read()
        .watch_pod(&Uid::from("p1"))
        .expect("conduits must exist");

    test.fetch
        .set(mk_pod("p1-new", "pod-1", "worker", "Running", "10.0.0.7"));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Replaced);

    let index = test.index.read();
    let snapshot = index.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].uid, Uid::from("p1-new"));
    assert!(stale.is_closed());
    assert!(index.conduits().is_open(&Uid::from("p1-new")));
    assert_eq!(index.conduits().len(), 1);
}

#[tokio::test]
async fn ineligible_recreated_pod_evicts_stale_uid() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");
    let stale = test
        .index
        .read()
        .watch_pod(&Uid::from("p1"))
        .expect("conduits must exist");

    // The pod is recreated under the same name and has not been scheduled yet.
    test.fetch
        .set(mk_pod("p1-new", "pod-1", "worker", "Pending", ""));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Removed);
    {
        let index = test.index.read();
        assert!(index.snapshot().is_empty());
        assert!(!index.is_tracked(&Uid::from("p1")));
        assert!(!index.is_tracked(&Uid::from("p1-new")));
        assert!(index.conduits().is_empty());
    }
    assert!(stale.is_closed());

    // Once it is running, the new pod is tracked.
    test.fetch
        .set(mk_pod("p1-new", "pod-1", "worker", "Running", "10.0.0.7"));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Inserted);
    assert!(test.index.read().is_tracked(&Uid::from("p1-new")));
}

#[tokio::test]
async fn unlabeled_recreated_pod_evicts_stale_uid() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");

    test.fetch.set(unlabeled(mk_pod(
        "p1-new",
        "pod-1",
        "worker",
        "Running",
        "10.0.0.7",
    )));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Removed);
    assert!(test.index.read().snapshot().is_empty());

    // Subsequent reconciles of the ineligible pod change nothing.
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Ignored);
}

#[tokio::test]
async fn deleting_recreated_pod_evicts_stale_uid() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");
    let stale = test
        .index
        .read()
        .watch_pod(&Uid::from("p1"))
        .expect("conduits must exist");

    test.fetch.set(deleting(mk_pod(
        "p1-new",
        "pod-1",
        "worker",
        "Running",
        "10.0.0.7",
    )));
    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Removed);
    assert!(stale.is_closed());
    {
        let index = test.index.read();
        assert!(index.snapshot().is_empty());
        assert!(index.conduits().is_empty());
    }

    let change = test.reconcile("pod-1").await.expect("reconcile must succeed");
    assert_eq!(change, Change::Untracked);
}

#[tokio::test]
async fn fetch_errors_leave_state_unchanged() {
    let test = TestConfig::default();
    test.fetch
        .set(mk_pod("p1", "pod-1", "worker", "Running", "10.0.0.5"));
    test.reconcile("pod-1").await.expect("reconcile must succeed");

    test.fetch.fail("pod-1");
    let error = test
        .reconcile("pod-1")
        .await
        .expect_err("reconcile must fail");
    assert!(matches!(error, SyncError::Fetch { .. }), "{error}");
    assert_eq!(error.kind(), "fetch");

    let index = test.index.read();
    assert_eq!(index.snapshot().len(), 1);
    assert!(index.conduits().is_open(&Uid::from("p1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reconciles_are_independent() {
    let test = TestConfig::default();
    const PODS: usize = 64;
    for i in 0..PODS {
        let app = if i % 4 == 0 { "other" } else { "worker" };
        test.fetch.set(mk_pod(
            &format!("uid-{i}"),
            &format!("pod-{i}"),
            app,
            "Running",
            &format!("10.0.1.{i}"),
        ));
    }

    let sync = Arc::new(test.sync());
    let tasks = (0..PODS)
        .map(|i| {
            let sync = sync.clone();
            tokio::spawn(async move {
                sync.reconcile(&PodRef::new("ns-0", format!("pod-{i}")))
                    .await
                    .expect("reconcile must succeed")
            })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await.expect("task must not panic");
    }

    let expected = PODS - PODS / 4;
    {
        let index = test.index.read();
        assert_eq!(index.snapshot().len(), expected);
        assert_eq!(index.conduits().len(), expected);
    }

    // Delete every tracked pod concurrently.
    for i in 0..PODS {
        test.fetch.unset(&format!("pod-{i}"));
    }
    let tasks = (0..PODS)
        .map(|i| {
            let sync = sync.clone();
            tokio::spawn(async move {
                sync.reconcile(&PodRef::new("ns-0", format!("pod-{i}")))
                    .await
                    .expect("reconcile must succeed")
            })
        })
        .collect::<Vec<_>>();
    let mut removed = 0;
    for task in tasks {
        if task.await.expect("task must not panic") == Change::Removed {
            removed += 1;
        }
    }
    assert_eq!(removed, expected);
    assert!(test.index.read().snapshot().is_empty());
    assert!(test.index.read().conduits().is_empty());
}

// === Test utilities ===

struct TestConfig {
    index: SharedIndex,
    membership: Arc<Membership>,
    fetch: FakeFetch,
    _tracing: tracing::subscriber::DefaultGuard,
}

#[derive(Clone, Debug, Default)]
struct FakeFetch(Arc<Mutex<HashMap<PodRef, Option<k8s::Pod>>>>);

impl TestConfig {
    fn sync(&self) -> Synchronizer<FakeFetch> {
        Synchronizer::new(
            self.index.clone(),
            self.membership.clone(),
            self.fetch.clone(),
        )
    }

    async fn reconcile(&self, name: &str) -> Result<Change, SyncError> {
        self.sync().reconcile(&PodRef::new("ns-0", name)).await
    }

    fn init_tracing() -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        )
    }
}

impl Default for TestConfig {
    fn default() -> TestConfig {
        Self {
            index: Index::shared(),
            membership: Arc::new(Membership::new("app", ["envoy-ingress", "worker"])),
            fetch: FakeFetch::default(),
            _tracing: Self::init_tracing(),
        }
    }
}

impl FakeFetch {
    fn set(&self, pod: k8s::Pod) {
        let reference = PodRef::new(
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.0.lock().insert(reference, Some(pod));
    }

    fn unset(&self, name: &str) {
        self.0.lock().remove(&PodRef::new("ns-0", name));
    }

    /// Causes fetches of the pod to fail.
    fn fail(&self, name: &str) {
        self.0.lock().insert(PodRef::new("ns-0", name), None);
    }
}

#[async_trait::async_trait]
impl FetchPod for FakeFetch {
    async fn fetch(&self, pod: &PodRef) -> anyhow::Result<Option<k8s::Pod>> {
        match self.0.lock().get(pod) {
            Some(Some(pod)) => Ok(Some(pod.clone())),
            Some(None) => Err(anyhow::anyhow!("apiserver unavailable")),
            None => Ok(None),
        }
    }
}

fn mk_pod(uid: &str, name: &str, app: &str, phase: &str, ip: &str) -> k8s::Pod {
    k8s::Pod {
        metadata: k8s::ObjectMeta {
            namespace: Some("ns-0".to_string()),
            name: Some(name.to_string()),
            uid: Some(uid.to_string()),
            labels: Some(maplit::btreemap! { "app".to_string() => app.to_string() }),
            ..Default::default()
        },
        status: Some(k8s::PodStatus {
            phase: Some(phase.to_string()),
            pod_ip: Some(ip.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn deleting(mut pod: k8s::Pod) -> k8s::Pod {
    pod.metadata.deletion_timestamp = Some(k8s::Time(Default::default()));
    pod
}

fn unlabeled(mut pod: k8s::Pod) -> k8s::Pod {
    pod.metadata.labels = None;
    pod
}
