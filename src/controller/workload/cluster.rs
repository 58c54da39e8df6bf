//! `kube::Api` implementation of [`ClusterApi`]

use super::{ClusterApi, PodOutcome, WorkloadError};
use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::Client;
use std::time::Duration;
use tracing::debug;

/// Cluster access through the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn api_error<'a>(
    operation: &'static str,
    kind: &'static str,
    name: &'a str,
) -> impl FnOnce(kube::Error) -> WorkloadError + 'a {
    move |err| WorkloadError::Api {
        operation,
        kind,
        name: name.to_string(),
        message: err.to_string(),
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

/// Pod finished, or gone (nothing left to wait for)
fn is_pod_finished(pod: Option<&Pod>) -> bool {
    pod.map_or(true, |pod| PodOutcome::of(pod).is_some())
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, WorkloadError> {
        self.pods(namespace)
            .get_opt(name)
            .await
            .map_err(api_error("get", "pod", name))
    }

    async fn remove_pod_finalizers(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), WorkloadError> {
        let patch = serde_json::json!({ "metadata": { "finalizers": null } });
        match self
            .pods(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(api_error("remove finalizers from", "pod", name)(err)),
        }
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), WorkloadError> {
        match self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => {
                debug!(pod = %name, "Pod already gone");
                Ok(())
            }
            Err(err) => Err(api_error("delete", "pod", name)(err)),
        }
    }

    async fn wait_pod_deleted(
        &self,
        namespace: &str,
        name: &str,
        uid: &str,
        timeout: Duration,
    ) -> Result<(), WorkloadError> {
        let deleted = await_condition(self.pods(namespace), name, conditions::is_deleted(uid));
        match tokio::time::timeout(timeout, deleted).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(WorkloadError::Api {
                operation: "watch deletion of",
                kind: "pod",
                name: name.to_string(),
                message: err.to_string(),
            }),
            Err(_) => Err(WorkloadError::Timeout {
                name: name.to_string(),
                condition: "be deleted",
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), WorkloadError> {
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map(|_| ())
            .map_err(api_error("create", "pod", name))
    }

    async fn wait_pod_finished(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<PodOutcome, WorkloadError> {
        let finished = await_condition(self.pods(namespace), name, is_pod_finished);
        match tokio::time::timeout(timeout, finished).await {
            Ok(Ok(Some(pod))) => Ok(PodOutcome::of(&pod)
                .unwrap_or_else(|| PodOutcome::Failed("pod did not finish".to_string()))),
            Ok(Ok(None)) => Ok(PodOutcome::Failed(
                "pod was deleted before it finished".to_string(),
            )),
            Ok(Err(err)) => Err(WorkloadError::Api {
                operation: "watch",
                kind: "pod",
                name: name.to_string(),
                message: err.to_string(),
            }),
            Err(_) => Err(WorkloadError::Timeout {
                name: name.to_string(),
                condition: "finish",
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn claim_exists(&self, namespace: &str, name: &str) -> Result<bool, WorkloadError> {
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        claims
            .get_opt(name)
            .await
            .map(|claim| claim.is_some())
            .map_err(api_error("get", "persistentvolumeclaim", name))
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), WorkloadError> {
        let name = claim.metadata.name.as_deref().unwrap_or_default();
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        claims
            .create(&PostParams::default(), claim)
            .await
            .map(|_| ())
            .map_err(api_error("create", "persistentvolumeclaim", name))
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<(), WorkloadError> {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        config_maps
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(config_map),
            )
            .await
            .map(|_| ())
            .map_err(api_error("apply", "configmap", name))
    }

    async fn apply_secret(&self, namespace: &str, secret: &Secret) -> Result<(), WorkloadError> {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(secret),
            )
            .await
            .map(|_| ())
            .map_err(api_error("apply", "secret", name))
    }
}
