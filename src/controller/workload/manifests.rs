//! # Manifests
//!
//! Pure builders for every object a sync creates. Nothing here talks to the
//! cluster, so the shape of each object is unit tested directly.

use super::names::{ResourceRef, UnitRole};
use super::{WorkloadError, WorkloadSettings};
use crate::crd::GitRepo;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Secret};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const DOCKERFILE_KEY: &str = "Dockerfile";
const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";
const DOCKER_CONFIG_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";

const WORKSPACE_DIR: &str = "/workspace";
const REPO_DIR: &str = "/workspace/repo";
const DOCKERFILE_DIR: &str = "/config";
const KANIKO_DOCKER_DIR: &str = "/kaniko/.docker";
const CACHE_DIR: &str = "/cache";
const GIT_SECRET_DIR: &str = "/etc/git-secret";

/// Inputs for the build pod
#[derive(Debug, Clone, Copy)]
pub struct BuildPodSpec<'a> {
    pub git_repo: &'a GitRepo,
    pub tagged_image: &'a str,
}

/// Inputs for the run pod
#[derive(Debug, Clone, Copy)]
pub struct RunPodSpec<'a> {
    pub image: &'a str,
    pub script: &'a str,
    pub environment: &'a [(String, String)],
}

fn metadata(target: &ResourceRef, name: String, labels: BTreeMap<String, String>) -> Value {
    let mut meta = json!({
        "name": name,
        "namespace": target.namespace,
        "labels": labels,
    });
    if let Some(owner) = target.owner_reference() {
        meta["ownerReferences"] = json!([owner]);
    }
    meta
}

fn from_json<K: DeserializeOwned>(kind: &'static str, value: Value) -> Result<K, WorkloadError> {
    serde_json::from_value(value).map_err(|e| WorkloadError::Manifest {
        kind,
        message: e.to_string(),
    })
}

/// ConfigMap holding the rendered Dockerfile
pub fn dockerfile_config_map(
    target: &ResourceRef,
    dockerfile: &str,
) -> Result<ConfigMap, WorkloadError> {
    from_json(
        "ConfigMap",
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": metadata(target, target.config_map_name(), target.labels()),
            "data": { DOCKERFILE_KEY: dockerfile },
        }),
    )
}

/// Docker config Secret used to push the image and pull it again
///
/// `docker_config` is the already decoded docker config JSON.
pub fn registry_secret(target: &ResourceRef, docker_config: &[u8]) -> Result<Secret, WorkloadError> {
    use base64::Engine;

    // Secret data travels base64 encoded on the wire
    let encoded = base64::engine::general_purpose::STANDARD.encode(docker_config);
    from_json(
        "Secret",
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": metadata(target, target.registry_secret_name(), target.labels()),
            "type": DOCKER_CONFIG_SECRET_TYPE,
            "data": { DOCKER_CONFIG_KEY: encoded },
        }),
    )
}

/// Build cache claim shared by every build of one resource
pub fn cache_claim(
    target: &ResourceRef,
    settings: &WorkloadSettings,
) -> Result<PersistentVolumeClaim, WorkloadError> {
    let mut spec = json!({
        "accessModes": ["ReadWriteOnce"],
        "resources": { "requests": { "storage": settings.cache_storage_size } },
    });
    if let Some(class) = &settings.cache_storage_class {
        spec["storageClassName"] = json!(class);
    }

    from_json(
        "PersistentVolumeClaim",
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": metadata(target, target.cache_claim_name(), target.labels()),
            "spec": spec,
        }),
    )
}

fn clone_args(git_repo: &GitRepo) -> Vec<String> {
    let mut args = vec!["clone".to_string(), "--depth".to_string(), "1".to_string()];
    let branch = git_repo.branch.trim();
    if !branch.is_empty() {
        args.push("--branch".to_string());
        args.push(branch.to_string());
    }
    args.push(git_repo.url.trim().to_string());
    args.push(REPO_DIR.to_string());
    args
}

/// Pod that clones the repository and builds and pushes the image with kaniko
pub fn build_pod(
    target: &ResourceRef,
    settings: &WorkloadSettings,
    spec: BuildPodSpec<'_>,
) -> Result<Pod, WorkloadError> {
    let mut volumes = vec![
        json!({ "name": "workspace", "emptyDir": {} }),
        json!({
            "name": "dockerfile",
            "configMap": {
                "name": target.config_map_name(),
                "items": [{ "key": DOCKERFILE_KEY, "path": DOCKERFILE_KEY }],
            },
        }),
        json!({
            "name": "docker-config",
            "secret": {
                "secretName": target.registry_secret_name(),
                "items": [{ "key": DOCKER_CONFIG_KEY, "path": "config.json" }],
            },
        }),
        json!({
            "name": "kaniko-cache",
            "persistentVolumeClaim": { "claimName": target.cache_claim_name() },
        }),
    ];

    let mut clone_mounts = vec![json!({ "name": "workspace", "mountPath": WORKSPACE_DIR })];
    let mut clone_env = Vec::new();
    if let Some(ssh_secret) = &settings.git_ssh_secret {
        volumes.push(json!({
            "name": "git-ssh",
            "secret": { "secretName": ssh_secret, "defaultMode": 0o400 },
        }));
        clone_mounts.push(json!({
            "name": "git-ssh",
            "mountPath": GIT_SECRET_DIR,
            "readOnly": true,
        }));
        clone_env.push(json!({
            "name": "GIT_SSH_COMMAND",
            "value": format!(
                "ssh -i {GIT_SECRET_DIR}/ssh-privatekey -o StrictHostKeyChecking=no"
            ),
        }));
    }

    let kaniko_args = vec![
        format!("--dockerfile={DOCKERFILE_DIR}/{DOCKERFILE_KEY}"),
        format!("--context=dir://{REPO_DIR}"),
        format!("--destination={}", spec.tagged_image),
        "--cache=true".to_string(),
        format!("--cache-dir={CACHE_DIR}"),
    ];

    from_json(
        "Pod",
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": metadata(
                target,
                target.pod_name(UnitRole::Build),
                target.pod_labels(UnitRole::Build),
            ),
            "spec": {
                "restartPolicy": "Never",
                "initContainers": [{
                    "name": "git-clone",
                    "image": settings.git_clone_image,
                    "command": ["git"],
                    "args": clone_args(spec.git_repo),
                    "env": clone_env,
                    "volumeMounts": clone_mounts,
                }],
                "containers": [{
                    "name": "kaniko",
                    "image": settings.kaniko_image,
                    "args": kaniko_args,
                    "env": [{ "name": "DOCKER_CONFIG", "value": KANIKO_DOCKER_DIR }],
                    "volumeMounts": [
                        { "name": "workspace", "mountPath": WORKSPACE_DIR },
                        { "name": "dockerfile", "mountPath": DOCKERFILE_DIR, "readOnly": true },
                        { "name": "docker-config", "mountPath": KANIKO_DOCKER_DIR, "readOnly": true },
                        { "name": "kaniko-cache", "mountPath": CACHE_DIR },
                    ],
                }],
                "volumes": volumes,
            },
        }),
    )
}

/// Environment for the run container
///
/// Variables pass through unchanged; keys that cannot be environment variable
/// names (empty or containing `=`) are dropped.
#[must_use]
pub fn environment(variables: &BTreeMap<String, String>) -> Vec<(String, String)> {
    variables
        .iter()
        .filter(|(key, _)| !key.is_empty() && !key.contains('='))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Pod that runs the selected script inside the built image
pub fn run_pod(
    target: &ResourceRef,
    spec: RunPodSpec<'_>,
) -> Result<Pod, WorkloadError> {
    let env: Vec<Value> = spec
        .environment
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    from_json(
        "Pod",
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": metadata(
                target,
                target.pod_name(UnitRole::Run),
                target.pod_labels(UnitRole::Run),
            ),
            "spec": {
                "restartPolicy": "Never",
                "imagePullSecrets": [{ "name": target.registry_secret_name() }],
                "containers": [{
                    "name": "terraform",
                    "image": spec.image,
                    // The tag is reused across commits of a branch; never run a node-cached copy
                    "imagePullPolicy": "Always",
                    "command": ["/bin/sh", "-c"],
                    "args": [spec.script],
                    "workingDir": "/app",
                    "env": env,
                }],
            },
        }),
    )
}
