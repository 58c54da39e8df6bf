//! # Pod Lifecycle
//!
//! Creates and replaces the execution units of a sync (the image build pod and
//! the script run pod) together with the objects they depend on: the
//! Dockerfile ConfigMap, the registry Secret and the build cache claim.
//!
//! Replacing a pod is always: strip finalizers, delete, wait until the old pod
//! is gone, create. The wait closes the window where a create could hit the
//! still-terminating previous pod.
//!
//! All cluster access goes through [`ClusterApi`]; [`KubeClusterApi`] is the
//! `kube::Api` implementation.

use crate::config::ControllerConfig;
use crate::crd::GitRepo;
use crate::observability::metrics;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

mod cluster;
pub mod dockerfile;
pub mod manifests;
mod names;

pub use cluster::KubeClusterApi;
pub use manifests::{BuildPodSpec, RunPodSpec};
pub use names::{ResourceRef, UnitRole};

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to {operation} {kind} {name}: {message}")]
    Api {
        operation: &'static str,
        kind: &'static str,
        name: String,
        message: String,
    },
    #[error("timed out after {seconds}s waiting for pod {name} to {condition}")]
    Timeout {
        name: String,
        condition: &'static str,
        seconds: u64,
    },
    #[error("pod {name} failed: {reason}")]
    PodFailed { name: String, reason: String },
    #[error("invalid container registry credential: {0}")]
    InvalidCredential(String),
    #[error("container registry image name is missing")]
    MissingImageName,
    #[error("git repository url is missing")]
    MissingRepository,
    #[error("invalid {kind} manifest: {message}")]
    Manifest { kind: &'static str, message: String },
}

/// Terminal phase of an execution unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodOutcome {
    Succeeded,
    Failed(String),
}

impl PodOutcome {
    /// Outcome of a pod, `None` while it is still pending or running
    #[must_use]
    pub fn of(pod: &Pod) -> Option<Self> {
        let status = pod.status.as_ref()?;
        match status.phase.as_deref()? {
            "Succeeded" => Some(PodOutcome::Succeeded),
            "Failed" => Some(PodOutcome::Failed(failure_reason(pod))),
            _ => None,
        }
    }
}

fn failure_reason(pod: &Pod) -> String {
    let terminated = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| {
            statuses
                .iter()
                .filter_map(|cs| cs.state.as_ref()?.terminated.as_ref())
                .find(|t| t.exit_code != 0)
        });

    if let Some(terminated) = terminated {
        let reason = terminated.reason.as_deref().unwrap_or("Error");
        return match terminated.message.as_deref().filter(|m| !m.is_empty()) {
            Some(message) => format!("{reason} (exit code {}): {message}", terminated.exit_code),
            None => format!("{reason} (exit code {})", terminated.exit_code),
        };
    }

    pod.status
        .as_ref()
        .and_then(|s| s.message.clone().or_else(|| s.reason.clone()))
        .unwrap_or_else(|| "pod phase Failed".to_string())
}

/// Cluster operations the pod lifecycle needs
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, WorkloadError>;

    /// Drop every finalizer from a pod so deletion can complete
    async fn remove_pod_finalizers(&self, namespace: &str, name: &str)
        -> Result<(), WorkloadError>;

    /// Request deletion; a pod that is already gone is not an error
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), WorkloadError>;

    /// Wait until the pod instance with `uid` no longer exists
    async fn wait_pod_deleted(
        &self,
        namespace: &str,
        name: &str,
        uid: &str,
        timeout: Duration,
    ) -> Result<(), WorkloadError>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), WorkloadError>;

    /// Wait until the pod reaches `Succeeded` or `Failed`
    async fn wait_pod_finished(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<PodOutcome, WorkloadError>;

    async fn claim_exists(&self, namespace: &str, name: &str) -> Result<bool, WorkloadError>;

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), WorkloadError>;

    /// Create or replace a ConfigMap
    async fn apply_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<(), WorkloadError>;

    /// Create or replace a Secret
    async fn apply_secret(&self, namespace: &str, secret: &Secret) -> Result<(), WorkloadError>;
}

/// Images, storage and timeouts used for execution units
#[derive(Debug, Clone)]
pub struct WorkloadSettings {
    pub kaniko_image: String,
    pub git_clone_image: String,
    pub terraform_base_image: String,
    pub cache_storage_size: String,
    pub cache_storage_class: Option<String>,
    pub git_ssh_secret: Option<String>,
    pub deletion_timeout: Duration,
    pub build_timeout: Duration,
    pub run_timeout: Duration,
}

impl From<&ControllerConfig> for WorkloadSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            kaniko_image: config.kaniko_image.clone(),
            git_clone_image: config.git_clone_image.clone(),
            terraform_base_image: config.terraform_base_image.clone(),
            cache_storage_size: config.cache_storage_size.clone(),
            cache_storage_class: config.cache_storage_class.clone(),
            git_ssh_secret: config.git_ssh_secret.clone(),
            deletion_timeout: config.pod_deletion_timeout(),
            build_timeout: config.build_timeout(),
            run_timeout: config.run_timeout(),
        }
    }
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

/// Manages the objects and execution units of every sync
#[derive(Clone)]
pub struct PodLifecycleManager {
    cluster: Arc<dyn ClusterApi>,
    settings: WorkloadSettings,
}

impl PodLifecycleManager {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>, settings: WorkloadSettings) -> Self {
        Self { cluster, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &WorkloadSettings {
        &self.settings
    }

    /// Replace the execution unit of `role` with `pod`
    ///
    /// Any existing pod of the same name has its finalizers removed, is
    /// deleted, and is waited on until gone before `pod` is created.
    pub async fn replace_pod(
        &self,
        target: &ResourceRef,
        role: UnitRole,
        pod: &Pod,
    ) -> Result<(), WorkloadError> {
        let name = target.pod_name(role);
        let namespace = target.namespace.as_str();

        if let Some(existing) = self.cluster.get_pod(namespace, &name).await? {
            let has_finalizers = existing
                .metadata
                .finalizers
                .as_ref()
                .is_some_and(|f| !f.is_empty());
            if has_finalizers {
                debug!(pod = %name, "Removing finalizers from existing pod");
                self.cluster.remove_pod_finalizers(namespace, &name).await?;
            }

            info!(pod = %name, "Deleting existing {} pod", role.as_str());
            self.cluster.delete_pod(namespace, &name).await?;
            metrics::increment_pod_operations(role.as_str(), "delete");

            match existing.metadata.uid.as_deref() {
                Some(uid) => {
                    self.cluster
                        .wait_pod_deleted(namespace, &name, uid, self.settings.deletion_timeout)
                        .await?;
                }
                None => warn!(pod = %name, "Existing pod has no uid, not waiting for deletion"),
            }
        }

        self.cluster.create_pod(namespace, pod).await?;
        metrics::increment_pod_operations(role.as_str(), "create");
        info!(pod = %name, "Created {} pod", role.as_str());
        Ok(())
    }

    /// Make sure the build cache claim exists, returning its name
    pub async fn ensure_cache_claim(&self, target: &ResourceRef) -> Result<String, WorkloadError> {
        let name = target.cache_claim_name();
        let namespace = target.namespace.as_str();

        if self.cluster.claim_exists(namespace, &name).await? {
            debug!(claim = %name, "Build cache claim already exists");
            return Ok(name);
        }

        let claim = manifests::cache_claim(target, &self.settings)?;
        if let Err(err) = self.cluster.create_claim(namespace, &claim).await {
            // Another sync of the same resource may have created it first
            if self.cluster.claim_exists(namespace, &name).await? {
                debug!(claim = %name, "Build cache claim created concurrently");
                return Ok(name);
            }
            return Err(err);
        }

        info!(claim = %name, "Created build cache claim");
        Ok(name)
    }

    /// Create or replace the Dockerfile ConfigMap, returning its name
    pub async fn apply_dockerfile(
        &self,
        target: &ResourceRef,
        dockerfile: &str,
    ) -> Result<String, WorkloadError> {
        let config_map = manifests::dockerfile_config_map(target, dockerfile)?;
        self.cluster
            .apply_config_map(&target.namespace, &config_map)
            .await?;
        Ok(target.config_map_name())
    }

    /// Create or replace the registry Secret from the base64 docker config
    pub async fn apply_registry_secret(
        &self,
        target: &ResourceRef,
        encoded_config: &str,
    ) -> Result<String, WorkloadError> {
        let docker_config = decode_registry_credential(encoded_config)?;
        let secret = manifests::registry_secret(target, &docker_config)?;
        self.cluster.apply_secret(&target.namespace, &secret).await?;
        Ok(target.registry_secret_name())
    }

    /// Build and push the image for a resource, returning the tagged reference
    ///
    /// Expects the Dockerfile ConfigMap and registry Secret to exist already.
    pub async fn build_image(
        &self,
        target: &ResourceRef,
        git_repo: &GitRepo,
        image_name: &str,
        dockerfile: &str,
    ) -> Result<String, WorkloadError> {
        if image_name.trim().is_empty() {
            return Err(WorkloadError::MissingImageName);
        }
        if git_repo.url.trim().is_empty() {
            return Err(WorkloadError::MissingRepository);
        }

        let tagged_image = dockerfile::tagged_image(image_name, git_repo, dockerfile);
        self.ensure_cache_claim(target).await?;

        let pod = manifests::build_pod(
            target,
            &self.settings,
            BuildPodSpec {
                git_repo,
                tagged_image: &tagged_image,
            },
        )?;
        self.replace_pod(target, UnitRole::Build, &pod).await?;
        self.await_success(target, UnitRole::Build, self.settings.build_timeout)
            .await?;

        info!(image = %tagged_image, "Image built");
        Ok(tagged_image)
    }

    /// Run `script` once in a fresh run pod and wait for it to finish
    pub async fn run_script(
        &self,
        target: &ResourceRef,
        image: &str,
        script: &str,
        environment: &[(String, String)],
    ) -> Result<(), WorkloadError> {
        let pod = manifests::run_pod(
            target,
            RunPodSpec {
                image,
                script,
                environment,
            },
        )?;
        self.replace_pod(target, UnitRole::Run, &pod).await?;
        self.await_success(target, UnitRole::Run, self.settings.run_timeout)
            .await
    }

    async fn await_success(
        &self,
        target: &ResourceRef,
        role: UnitRole,
        timeout: Duration,
    ) -> Result<(), WorkloadError> {
        let name = target.pod_name(role);
        match self
            .cluster
            .wait_pod_finished(&target.namespace, &name, timeout)
            .await?
        {
            PodOutcome::Succeeded => Ok(()),
            PodOutcome::Failed(reason) => Err(WorkloadError::PodFailed { name, reason }),
        }
    }
}

/// Decode the base64 docker config JSON
pub fn decode_registry_credential(encoded: &str) -> Result<Vec<u8>, WorkloadError> {
    use base64::Engine;

    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(WorkloadError::InvalidCredential(
            "CONTAINER_REGISTRY_SECRET is not set".to_string(),
        ));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| WorkloadError::InvalidCredential(format!("not valid base64: {e}")))?;
    serde_json::from_slice::<serde_json::Value>(&decoded)
        .map_err(|e| WorkloadError::InvalidCredential(format!("not a docker config JSON: {e}")))?;
    Ok(decoded)
}
