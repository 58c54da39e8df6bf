//! # Reconcile Scheduler Tests
//!
//! Periodic passes over listed resources.

mod common;

use async_trait::async_trait;
use common::{resource, FakeCluster, FakeLister, Harness, RecordingSleeper};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use terraform_controller::controller::retry::RetryPolicy;
use terraform_controller::controller::status::StatusReporter;
use terraform_controller::controller::sync::SyncCoordinator;
use terraform_controller::controller::workload::{
    PodLifecycleManager, ResourceRef, WorkloadSettings,
};
use terraform_controller::crd::TerraformStatus;
use terraform_controller::runtime::scheduler::ReconcileScheduler;

async fn join_all(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_tick_syncs_every_resource() {
    let harness = Harness::new();
    let lister = FakeLister::with(vec![
        resource("alpha", "infra", false),
        resource("beta", "infra", false),
        resource("gamma", "apps", false),
    ]);
    let scheduler = ReconcileScheduler::new(
        lister.clone(),
        harness.coordinator.clone(),
        Duration::from_secs(300),
        10,
    );

    let handles = scheduler.tick().await;
    assert_eq!(handles.len(), 3);
    join_all(handles).await;

    let mut synced: Vec<_> = harness
        .status
        .reports()
        .into_iter()
        .map(|(target, status)| {
            assert!(status.is_success());
            target.key()
        })
        .collect();
    synced.sort();
    assert_eq!(synced, vec!["apps/gamma", "infra/alpha", "infra/beta"]);
    assert_eq!(lister.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deleting_resource_runs_destroy() {
    let harness = Harness::new();
    let scheduler = ReconcileScheduler::new(
        FakeLister::with(vec![resource("old", "infra", true)]),
        harness.coordinator.clone(),
        Duration::from_secs(300),
        10,
    );

    join_all(scheduler.tick().await).await;

    let run = harness.cluster.pod("infra", "old-terraform-run-pod").unwrap();
    assert_eq!(
        run.spec.unwrap().containers[0].args.clone().unwrap(),
        vec!["./destroy.sh"]
    );
}

#[tokio::test]
async fn test_list_failure_skips_tick() {
    let harness = Harness::new();
    let lister = FakeLister::failing();
    let scheduler = ReconcileScheduler::new(
        lister.clone(),
        harness.coordinator.clone(),
        Duration::from_secs(300),
        10,
    );

    assert!(scheduler.tick().await.is_empty());
    assert_eq!(lister.calls.load(Ordering::SeqCst), 1);
    assert!(harness.status.reports().is_empty());
    assert!(harness.cluster.ops().is_empty());
}

/// Tracks how many status writes overlap
#[derive(Default)]
struct OverlapReporter {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

#[async_trait]
impl StatusReporter for OverlapReporter {
    async fn report(&self, _target: &ResourceRef, _status: &TerraformStatus) -> anyhow::Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn scheduler_reporting_to(
    reporter: Arc<dyn StatusReporter>,
    max_concurrent: usize,
    resources: usize,
) -> ReconcileScheduler {
    let (backends, _) = common::fake_backends();
    let coordinator = SyncCoordinator::new(
        backends,
        PodLifecycleManager::new(FakeCluster::new(), WorkloadSettings::default()),
        reporter,
        RetryPolicy::new(1, Duration::ZERO),
        common::registry_credential(),
    )
    .with_sleeper(Arc::new(RecordingSleeper::default()));

    let listed = (0..resources)
        .map(|i| resource(&format!("tf-{i}"), "infra", false))
        .collect();
    ReconcileScheduler::new(
        FakeLister::with(listed),
        coordinator,
        Duration::from_secs(300),
        max_concurrent,
    )
}

fn overlap_scheduler(max_concurrent: usize, resources: usize) -> (ReconcileScheduler, Arc<OverlapReporter>) {
    let reporter = Arc::new(OverlapReporter::default());
    let scheduler = scheduler_reporting_to(reporter.clone(), max_concurrent, resources);
    (scheduler, reporter)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_is_bounded() {
    let (scheduler, reporter) = overlap_scheduler(2, 6);

    join_all(scheduler.tick().await).await;

    assert_eq!(reporter.total.load(Ordering::SeqCst), 6);
    assert!(reporter.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_single_permit_serializes_syncs() {
    let (scheduler, reporter) = overlap_scheduler(0, 3);

    join_all(scheduler.tick().await).await;

    assert_eq!(reporter.total.load(Ordering::SeqCst), 3);
    assert_eq!(reporter.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_when_not_ready() {
    let harness = Harness::new();
    let lister = FakeLister::with(vec![]);
    let scheduler = ReconcileScheduler::new(
        lister.clone(),
        harness.coordinator.clone(),
        Duration::from_secs(10),
        1,
    );

    let is_ready = Arc::new(AtomicBool::new(false));
    scheduler.run(is_ready).await;

    assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_ticks_on_interval() {
    let harness = Harness::new();
    let lister = FakeLister::with(vec![]);
    let scheduler = Arc::new(ReconcileScheduler::new(
        lister.clone(),
        harness.coordinator.clone(),
        Duration::from_secs(10),
        1,
    ));

    let is_ready = Arc::new(AtomicBool::new(true));
    let runner = {
        let scheduler = scheduler.clone();
        let is_ready = is_ready.clone();
        tokio::spawn(async move { scheduler.run(is_ready).await })
    };

    tokio::time::sleep(Duration::from_secs(25)).await;
    is_ready.store(false, Ordering::Relaxed);
    runner.await.unwrap();

    // Immediately, then at 10s and 20s
    assert_eq!(lister.calls.load(Ordering::SeqCst), 3);
}

/// Status writes that never complete, leaving every sync stuck
struct StalledReporter;

#[async_trait]
impl StatusReporter for StalledReporter {
    async fn report(&self, _target: &ResourceRef, _status: &TerraformStatus) -> anyhow::Result<()> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_pending_resources_are_not_queued_again() {
    let scheduler = scheduler_reporting_to(Arc::new(StalledReporter), 2, 2);

    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.extend(scheduler.tick().await);
        tokio::task::yield_now().await;
    }

    assert_eq!(handles.len(), 2);
    assert_eq!(scheduler.in_flight(), 2);
    assert!(handles.iter().all(|handle| !handle.is_finished()));

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    // Cancelled syncs release their resources
    assert_eq!(scheduler.in_flight(), 0);
    let handles = scheduler.tick().await;
    assert_eq!(handles.len(), 2);
    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_finished_resources_are_synced_again() {
    let harness = Harness::new();
    let scheduler = ReconcileScheduler::new(
        FakeLister::with(vec![resource("alpha", "infra", false)]),
        harness.coordinator.clone(),
        Duration::from_secs(300),
        1,
    );

    join_all(scheduler.tick().await).await;
    assert_eq!(scheduler.in_flight(), 0);
    join_all(scheduler.tick().await).await;

    assert_eq!(harness.status.reports().len(), 2);
}
