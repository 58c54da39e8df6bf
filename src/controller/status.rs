//! # Status Reporting
//!
//! Writes the outcome of a sync to the `status` subresource of the Terraform
//! resource. Only the latest outcome is kept.

use crate::constants::FIELD_MANAGER;
use crate::controller::workload::ResourceRef;
use crate::crd::{Terraform, TerraformStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use tracing::debug;

/// Persists the outcome of a sync
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, target: &ResourceRef, status: &TerraformStatus) -> Result<()>;
}

/// Patches `status` on the Terraform resource
#[derive(Clone)]
pub struct KubeStatusReporter {
    client: Client,
}

impl KubeStatusReporter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Merge patch body replacing the status
#[must_use]
pub fn status_patch(status: &TerraformStatus) -> serde_json::Value {
    serde_json::json!({ "status": status })
}

#[async_trait]
impl StatusReporter for KubeStatusReporter {
    async fn report(&self, target: &ResourceRef, status: &TerraformStatus) -> Result<()> {
        let api: Api<Terraform> = Api::namespaced(self.client.clone(), &target.namespace);

        api.patch_status(
            &target.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(status_patch(status)),
        )
        .await
        .with_context(|| format!("Failed to update status of Terraform {}", target.key()))?;

        debug!(
            resource.name = %target.name,
            resource.namespace = %target.namespace,
            state = %status.state,
            "Status updated"
        );
        Ok(())
    }
}
