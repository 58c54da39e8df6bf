//! # Terraform Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terraform Custom Resource Definition
///
/// Declares the desired state of one piece of infrastructure: where the
/// Terraform code lives, which image to build it into, which backend stores
/// its state, and which scripts deploy and destroy it.
///
/// # Example
///
/// ```yaml
/// apiVersion: alustan.io/v1alpha1
/// kind: Terraform
/// metadata:
///   name: staging-vpc
///   namespace: infra
/// spec:
///   variables:
///     TF_VAR_workspace: staging
///     TF_VAR_region: us-east-1
///   backend:
///     provider: aws
///     s3: my-terraform-state
///     dynamoDB: my-terraform-locks
///     region: us-east-1
///   scripts:
///     deploy: ./deploy.sh
///     destroy: ./destroy.sh
///   gitRepo:
///     url: git@github.com:acme/infra.git
///     branch: main
///   containerRegistry:
///     imageName: registry.example.com/acme/staging-vpc
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Terraform",
    group = "alustan.io",
    version = "v1alpha1",
    plural = "terraforms",
    namespaced,
    status = "crate::crd::TerraformStatus",
    shortname = "tf",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Message", "type":"string", "jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TerraformSpec {
    /// Variables exported into the environment of the deploy/destroy script
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Remote-state backend configuration
    /// The `provider` key selects the backend implementation, remaining keys are provider-specific
    #[serde(default)]
    pub backend: BTreeMap<String, String>,
    /// Scripts run inside the built image
    #[serde(default)]
    pub scripts: Scripts,
    /// Repository holding the Terraform code
    #[serde(default)]
    pub git_repo: GitRepo,
    /// Registry the built image is pushed to
    #[serde(default)]
    pub container_registry: ContainerRegistry,
}

/// Deploy and destroy entry points
///
/// An empty script disables the corresponding action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scripts {
    #[serde(default)]
    pub deploy: String,
    #[serde(default)]
    pub destroy: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRepo {
    #[serde(default)]
    pub url: String,
    /// Branch to check out (remote default branch when empty)
    #[serde(default)]
    pub branch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRegistry {
    /// Image repository without a tag; the controller appends one
    #[serde(default)]
    pub image_name: String,
}
