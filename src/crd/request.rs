//! # Sync Request
//!
//! The unit of work handed to the sync pipeline: a snapshot of one Terraform
//! resource plus whether it is being torn down.

use crate::constants::DEFAULT_NAMESPACE;
use crate::crd::{Terraform, TerraformSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::{Deserialize, Serialize};

/// The observed parent object, as delivered by the webhook caller
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentResource {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TerraformSpec,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
}

/// One desired-state evaluation for exactly one resource
///
/// Built fresh per invocation and never mutated afterwards.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub parent: ParentResource,
    #[serde(default)]
    pub finalizing: bool,
}

impl SyncRequest {
    /// Snapshot a listed resource; it is finalizing once deletion has been requested
    #[must_use]
    pub fn from_resource(resource: &Terraform) -> Self {
        Self {
            parent: ParentResource {
                api_version: Terraform::api_version(&()).to_string(),
                kind: Terraform::kind(&()).to_string(),
                metadata: resource.metadata.clone(),
                spec: resource.spec.clone(),
                status: resource
                    .status
                    .as_ref()
                    .and_then(|s| serde_json::to_value(s).ok()),
            },
            finalizing: resource.metadata.deletion_timestamp.is_some(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.parent.metadata.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.parent
            .metadata
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
    }

    #[must_use]
    pub fn spec(&self) -> &TerraformSpec {
        &self.parent.spec
    }
}
