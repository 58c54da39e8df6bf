//! # Reconcile Scheduler
//!
//! Periodic backstop for the sync webhook. Every tick lists all Terraform
//! resources and starts one sync per resource, so resources converge even when
//! a webhook call was lost.
//!
//! Syncs run as independent tasks. A semaphore bounds how many run at once;
//! a tick only spawns tasks and never waits for them. A resource whose
//! scheduled sync is still queued or running is skipped, so each resource has
//! at most one scheduled sync outstanding.

use crate::controller::sync::SyncCoordinator;
use crate::controller::workload::ResourceRef;
use crate::crd::{SyncRequest, Terraform};
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Source of the resources to reconcile
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn list(&self) -> Result<Vec<Terraform>>;
}

/// Lists Terraform resources across all namespaces
#[derive(Clone)]
pub struct KubeResourceLister {
    api: Api<Terraform>,
}

impl KubeResourceLister {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl ResourceLister for KubeResourceLister {
    async fn list(&self) -> Result<Vec<Terraform>> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .context("Failed to list Terraform resources")?;
        Ok(list.items)
    }
}

/// Keys of resources with a scheduled sync queued or running
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    /// Claim `key`, `None` when it is already claimed
    fn claim(&self, key: String) -> Option<InFlightGuard> {
        let mut keys = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.0),
            key,
        })
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Releases its key when the sync task ends, however it ends
struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct ReconcileScheduler {
    lister: Arc<dyn ResourceLister>,
    coordinator: SyncCoordinator,
    interval: Duration,
    permits: Arc<Semaphore>,
    in_flight: InFlight,
}

impl ReconcileScheduler {
    /// `interval` is clamped to at least one second and `max_concurrent_syncs`
    /// to at least one
    #[must_use]
    pub fn new(
        lister: Arc<dyn ResourceLister>,
        coordinator: SyncCoordinator,
        interval: Duration,
        max_concurrent_syncs: usize,
    ) -> Self {
        Self {
            lister,
            coordinator,
            interval: interval.max(Duration::from_secs(1)),
            permits: Arc::new(Semaphore::new(max_concurrent_syncs.max(1))),
            in_flight: InFlight::default(),
        }
    }

    /// Number of resources with a scheduled sync queued or running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Start one sync per listed resource
    ///
    /// Returns the handles of the spawned syncs; dropping them detaches the
    /// tasks. Resources whose previous scheduled sync has not finished are
    /// skipped. A listing failure is logged and nothing is spawned.
    pub async fn tick(&self) -> Vec<JoinHandle<()>> {
        metrics::increment_reconcile_ticks();

        let resources = match self.lister.list().await {
            Ok(resources) => resources,
            Err(e) => {
                metrics::increment_reconcile_list_errors();
                error!("Skipping reconcile pass: {:#}", e);
                return Vec::new();
            }
        };

        info!("Reconciling {} Terraform resources", resources.len());
        let mut handles = Vec::with_capacity(resources.len());
        for resource in &resources {
            let request = SyncRequest::from_resource(resource);
            let key = ResourceRef::from_request(&request).key();
            match self.in_flight.claim(key) {
                Some(guard) => handles.push(self.spawn_sync(request, guard)),
                None => {
                    metrics::increment_reconcile_skipped();
                    debug!(
                        resource.name = request.name(),
                        resource.namespace = request.namespace(),
                        "Previous scheduled sync still pending, skipping"
                    );
                }
            }
        }
        handles
    }

    fn spawn_sync(&self, request: SyncRequest, guard: InFlightGuard) -> JoinHandle<()> {
        let permits = Arc::clone(&self.permits);
        let coordinator = self.coordinator.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            debug!(
                resource.name = request.name(),
                resource.namespace = request.namespace(),
                "Scheduled sync started"
            );
            metrics::inc_syncs_in_flight();
            coordinator.sync(&request).await;
            metrics::dec_syncs_in_flight();
        })
    }

    /// Tick every interval until `is_ready` turns false
    ///
    /// The first pass runs immediately, which also picks up resources created
    /// while the controller was down.
    pub async fn run(&self, is_ready: Arc<AtomicBool>) {
        info!(
            "Reconcile scheduler started (interval {}s)",
            self.interval.as_secs()
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !is_ready.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping reconcile scheduler");
                break;
            }
            self.tick().await;
        }
    }
}
