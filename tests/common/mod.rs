//! Common test utilities for integration tests
//!
//! In-memory stand-ins for the cluster, the status subresource, the resource
//! listing and backend providers, plus builders for sync requests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use base64::Engine;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use terraform_controller::controller::backend::{BackendError, BackendProvider, BackendRegistry};
use terraform_controller::controller::retry::{RetryPolicy, Sleeper};
use terraform_controller::controller::status::StatusReporter;
use terraform_controller::controller::sync::SyncCoordinator;
use terraform_controller::controller::workload::{
    ClusterApi, PodLifecycleManager, PodOutcome, ResourceRef, WorkloadError, WorkloadSettings,
};
use terraform_controller::crd::{SyncRequest, Terraform, TerraformStatus};
use terraform_controller::runtime::scheduler::ResourceLister;
use zeroize::Zeroizing;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// In-memory cluster
///
/// Every call is appended to [`FakeCluster::ops`] as `"<op> <namespace>/<name>"`.
/// A deleted pod only disappears once it has no finalizers left, so waiting
/// on a pod whose finalizers were never removed times out.
#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<HashMap<String, Pod>>,
    terminating: Mutex<HashSet<String>>,
    claims: Mutex<HashSet<String>>,
    config_maps: Mutex<HashMap<String, ConfigMap>>,
    secrets: Mutex<HashMap<String, Secret>>,
    outcomes: Mutex<HashMap<String, VecDeque<PodOutcome>>>,
    failing: Mutex<HashSet<&'static str>>,
    claim_race: Mutex<bool>,
    next_uid: AtomicUsize,
    ops: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, op: &str, namespace: &str, name: &str) {
        self.ops
            .lock()
            .unwrap()
            .push(format!("{op} {}", key(namespace, name)));
    }

    fn check(&self, op: &'static str, kind: &'static str, name: &str) -> Result<(), WorkloadError> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(WorkloadError::Api {
                operation: op,
                kind,
                name: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    /// Every call made so far
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Calls whose operation name is `op`
    pub fn ops_named(&self, op: &str) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter(|o| o.split(' ').next() == Some(op))
            .collect()
    }

    /// Make every future call of `op` fail
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// The next `create_claim` creates the claim and still reports a conflict
    pub fn simulate_claim_race(&self) {
        *self.claim_race.lock().unwrap() = true;
    }

    /// Terminal phases handed out, in order, to waits on `pod_name`
    ///
    /// Once the queue is drained every wait succeeds.
    pub fn script_outcomes(&self, pod_name: &str, outcomes: Vec<PodOutcome>) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(pod_name.to_string(), outcomes.into());
    }

    /// Seed an existing pod
    pub fn insert_pod(&self, namespace: &str, pod: Pod) {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.lock().unwrap().insert(key(namespace, &name), pod);
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn pod_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pods.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn claim_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.claims.lock().unwrap().iter().cloned().collect();
        names.sort();
        names
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.config_maps
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn config_map_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.config_maps.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.secrets.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Nothing was touched beyond reads
    pub fn has_no_side_effects(&self) -> bool {
        self.pod_names().is_empty()
            && self.claim_names().is_empty()
            && self.config_map_names().is_empty()
            && self.secret_names().is_empty()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, WorkloadError> {
        self.record("get_pod", namespace, name);
        self.check("get_pod", "pod", name)?;
        Ok(self.pod(namespace, name))
    }

    async fn remove_pod_finalizers(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), WorkloadError> {
        self.record("remove_finalizers", namespace, name);
        self.check("remove_finalizers", "pod", name)?;
        if let Some(pod) = self.pods.lock().unwrap().get_mut(&key(namespace, name)) {
            pod.metadata.finalizers = None;
        }
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), WorkloadError> {
        self.record("delete_pod", namespace, name);
        self.check("delete_pod", "pod", name)?;
        self.terminating.lock().unwrap().insert(key(namespace, name));
        Ok(())
    }

    async fn wait_pod_deleted(
        &self,
        namespace: &str,
        name: &str,
        _uid: &str,
        timeout: Duration,
    ) -> Result<(), WorkloadError> {
        self.record("wait_deleted", namespace, name);
        let k = key(namespace, name);
        let mut pods = self.pods.lock().unwrap();
        let blocked = pods
            .get(&k)
            .and_then(|p| p.metadata.finalizers.as_ref())
            .is_some_and(|f| !f.is_empty());
        if blocked {
            return Err(WorkloadError::Timeout {
                name: name.to_string(),
                condition: "be deleted",
                seconds: timeout.as_secs(),
            });
        }
        if self.terminating.lock().unwrap().remove(&k) {
            pods.remove(&k);
        }
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), WorkloadError> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.record("create_pod", namespace, &name);
        self.check("create_pod", "pod", &name)?;

        let mut pods = self.pods.lock().unwrap();
        let k = key(namespace, &name);
        if pods.contains_key(&k) {
            return Err(WorkloadError::Api {
                operation: "create",
                kind: "pod",
                name,
                message: "already exists".to_string(),
            });
        }
        let mut created = pod.clone();
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst);
        created.metadata.uid = Some(format!("uid-{uid}"));
        pods.insert(k, created);
        Ok(())
    }

    async fn wait_pod_finished(
        &self,
        namespace: &str,
        name: &str,
        _timeout: Duration,
    ) -> Result<PodOutcome, WorkloadError> {
        self.record("wait_finished", namespace, name);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PodOutcome::Succeeded);
        Ok(outcome)
    }

    async fn claim_exists(&self, namespace: &str, name: &str) -> Result<bool, WorkloadError> {
        self.record("claim_exists", namespace, name);
        self.check("claim_exists", "persistentvolumeclaim", name)?;
        Ok(self.claims.lock().unwrap().contains(&key(namespace, name)))
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), WorkloadError> {
        let name = claim.metadata.name.clone().unwrap_or_default();
        self.record("create_claim", namespace, &name);

        let mut race = self.claim_race.lock().unwrap();
        if *race {
            *race = false;
            self.claims.lock().unwrap().insert(key(namespace, &name));
            return Err(WorkloadError::Api {
                operation: "create",
                kind: "persistentvolumeclaim",
                name,
                message: "already exists".to_string(),
            });
        }
        drop(race);

        self.check("create_claim", "persistentvolumeclaim", &name)?;
        self.claims.lock().unwrap().insert(key(namespace, &name));
        Ok(())
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<(), WorkloadError> {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.record("apply_config_map", namespace, &name);
        self.check("apply_config_map", "configmap", &name)?;
        self.config_maps
            .lock()
            .unwrap()
            .insert(key(namespace, &name), config_map.clone());
        Ok(())
    }

    async fn apply_secret(&self, namespace: &str, secret: &Secret) -> Result<(), WorkloadError> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.record("apply_secret", namespace, &name);
        self.check("apply_secret", "secret", &name)?;
        self.secrets
            .lock()
            .unwrap()
            .insert(key(namespace, &name), secret.clone());
        Ok(())
    }
}

/// Records every status write; optionally fails them
#[derive(Default)]
pub struct FakeStatusReporter {
    reports: Mutex<Vec<(ResourceRef, TerraformStatus)>>,
    fail: bool,
}

impl FakeStatusReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::default(),
            fail: true,
        })
    }

    pub fn reports(&self) -> Vec<(ResourceRef, TerraformStatus)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusReporter for FakeStatusReporter {
    async fn report(&self, target: &ResourceRef, status: &TerraformStatus) -> anyhow::Result<()> {
        self.reports
            .lock()
            .unwrap()
            .push((target.clone(), status.clone()));
        if self.fail {
            anyhow::bail!("status subresource unavailable");
        }
        Ok(())
    }
}

/// Backend named `fake` that counts setups and requires a `bucket` key
#[derive(Default)]
pub struct FakeBackend {
    pub setups: AtomicUsize,
}

#[async_trait]
impl BackendProvider for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn setup_backend(&self, config: &BTreeMap<String, String>) -> Result<(), BackendError> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        match config.get("bucket") {
            Some(bucket) if !bucket.is_empty() => Ok(()),
            _ => Err(BackendError::MissingKey {
                provider: "fake".to_string(),
                key: "bucket".to_string(),
            }),
        }
    }

    fn dockerfile_additions(&self) -> String {
        "RUN echo fake-backend".to_string()
    }
}

/// Registry holding only [`FakeBackend`]
pub fn fake_backends() -> (Arc<BackendRegistry>, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend::default());
    let mut registry = BackendRegistry::new();
    registry.register(backend.clone());
    (Arc::new(registry), backend)
}

/// Sleeper that returns immediately and remembers what it was asked to wait
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Lister returning a fixed set of resources, or an error
pub struct FakeLister {
    resources: Option<Vec<Terraform>>,
    pub calls: AtomicUsize,
}

impl FakeLister {
    pub fn with(resources: Vec<Terraform>) -> Arc<Self> {
        Arc::new(Self {
            resources: Some(resources),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            resources: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ResourceLister for FakeLister {
    async fn list(&self) -> anyhow::Result<Vec<Terraform>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.resources {
            Some(resources) => Ok(resources.clone()),
            None => anyhow::bail!("the server is currently unable to handle the request"),
        }
    }
}

/// Base64 docker config JSON as carried by `CONTAINER_REGISTRY_SECRET`
pub fn registry_credential() -> Zeroizing<String> {
    let config = r#"{"auths":{"registry.example.com":{"auth":"dXNlcjpwYXNz"}}}"#;
    Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(config))
}

/// A complete resource spec with a deploy and destroy script and no backend
pub fn spec_json() -> serde_json::Value {
    serde_json::json!({
        "variables": { "TF_VAR_region": "eu-west-1" },
        "backend": {},
        "scripts": { "deploy": "./deploy.sh", "destroy": "./destroy.sh" },
        "gitRepo": { "url": "https://example.com/acme/infra.git", "branch": "main" },
        "containerRegistry": { "imageName": "registry.example.com/acme/infra" }
    })
}

/// Webhook body for `namespace/name` with the given spec
pub fn request_json(
    name: &str,
    namespace: &str,
    spec: serde_json::Value,
    finalizing: bool,
) -> serde_json::Value {
    serde_json::json!({
        "parent": {
            "apiVersion": "alustan.io/v1alpha1",
            "kind": "Terraform",
            "metadata": { "name": name, "namespace": namespace, "uid": format!("{name}-uid") },
            "spec": spec,
            "status": {}
        },
        "finalizing": finalizing
    })
}

pub fn request(
    name: &str,
    namespace: &str,
    spec: serde_json::Value,
    finalizing: bool,
) -> SyncRequest {
    serde_json::from_value(request_json(name, namespace, spec, finalizing)).unwrap()
}

/// A listed resource, marked for deletion when `deleting`
pub fn resource(name: &str, namespace: &str, deleting: bool) -> Terraform {
    let mut metadata = serde_json::json!({ "name": name, "namespace": namespace });
    if deleting {
        metadata["deletionTimestamp"] = serde_json::json!("2026-01-01T00:00:00Z");
    }
    serde_json::from_value(serde_json::json!({
        "apiVersion": "alustan.io/v1alpha1",
        "kind": "Terraform",
        "metadata": metadata,
        "spec": spec_json()
    }))
    .unwrap()
}

/// Everything a coordinator under test talks to
pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub status: Arc<FakeStatusReporter>,
    pub backend: Arc<FakeBackend>,
    pub sleeper: Arc<RecordingSleeper>,
    pub coordinator: SyncCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_status(FakeStatusReporter::new())
    }

    pub fn with_status(status: Arc<FakeStatusReporter>) -> Self {
        let cluster = FakeCluster::new();
        let (backends, backend) = fake_backends();
        let sleeper = Arc::new(RecordingSleeper::default());
        let workloads = PodLifecycleManager::new(cluster.clone(), WorkloadSettings::default());

        let coordinator = SyncCoordinator::new(
            backends,
            workloads,
            status.clone(),
            RetryPolicy::new(10, Duration::from_secs(60)),
            registry_credential(),
        )
        .with_sleeper(sleeper.clone());

        Self {
            cluster,
            status,
            backend,
            sleeper,
            coordinator,
        }
    }
}
