//! # Object Naming
//!
//! Every object the controller creates for a resource has a name derived only
//! from the resource name and the object's role, scoped by the resource
//! namespace. Two resources never share an object; one resource always
//! reuses the same names.

use crate::constants::{LABEL_MANAGED_BY, LABEL_ROLE, LABEL_TERRAFORM};
use crate::crd::{SyncRequest, Terraform};
use kube::Resource;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Longest value Kubernetes accepts for a label
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Hex characters of the name digest kept in a shortened label value
const LABEL_HASH_LEN: usize = 12;

/// Role of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitRole {
    /// Builds and pushes the Terraform image
    Build,
    /// Runs the deploy or destroy script
    Run,
}

impl UnitRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UnitRole::Build => "build",
            UnitRole::Run => "run",
        }
    }

    fn pod_suffix(self) -> &'static str {
        match self {
            UnitRole::Build => "docker-build-pod",
            UnitRole::Run => "terraform-run-pod",
        }
    }
}

/// Identity of the Terraform resource a sync works on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub name: String,
    pub namespace: String,
    /// Set when known; generated objects are then owned by the resource
    pub uid: Option<String>,
}

impl ResourceRef {
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: None,
        }
    }

    #[must_use]
    pub fn from_request(request: &SyncRequest) -> Self {
        Self {
            name: request.name().to_string(),
            namespace: request.namespace().to_string(),
            uid: request
                .parent
                .metadata
                .uid
                .clone()
                .filter(|uid| !uid.is_empty()),
        }
    }

    #[must_use]
    pub fn pod_name(&self, role: UnitRole) -> String {
        format!("{}-{}", self.name, role.pod_suffix())
    }

    #[must_use]
    pub fn config_map_name(&self) -> String {
        format!("{}-dockerfile-configmap", self.name)
    }

    #[must_use]
    pub fn registry_secret_name(&self) -> String {
        format!("{}-container-secret", self.name)
    }

    #[must_use]
    pub fn cache_claim_name(&self) -> String {
        format!("{}-kaniko-cache-pvc", self.name)
    }

    /// Labels shared by every generated object
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), crate::constants::FIELD_MANAGER.to_string()),
            (LABEL_TERRAFORM.to_string(), label_value(&self.name)),
        ])
    }

    /// Labels for an execution unit
    #[must_use]
    pub fn pod_labels(&self, role: UnitRole) -> BTreeMap<String, String> {
        let mut labels = self.labels();
        labels.insert(LABEL_ROLE.to_string(), role.as_str().to_string());
        labels
    }

    /// Owner reference pointing at the Terraform resource, when its uid is known
    #[must_use]
    pub fn owner_reference(&self) -> Option<serde_json::Value> {
        self.uid.as_ref().map(|uid| {
            serde_json::json!({
                "apiVersion": Terraform::api_version(&()),
                "kind": Terraform::kind(&()),
                "name": self.name,
                "uid": uid,
                "controller": true,
                "blockOwnerDeletion": false,
            })
        })
    }

    /// `namespace/name`, used in logs and metrics
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Fit a resource name into a label value
///
/// Names longer than a label allows keep a prefix and gain a digest suffix, so
/// distinct long names still get distinct values.
fn label_value(name: &str) -> String {
    if name.len() <= MAX_LABEL_VALUE_LEN {
        return name.to_string();
    }

    let digest = Sha256::digest(name.as_bytes());
    let hash: String = digest
        .iter()
        .take(LABEL_HASH_LEN / 2)
        .map(|byte| format!("{byte:02x}"))
        .collect();

    let prefix: String = name
        .chars()
        .take(MAX_LABEL_VALUE_LEN - LABEL_HASH_LEN - 1)
        .collect();
    // The segment before the separator must end alphanumeric
    let prefix = prefix.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    format!("{prefix}-{hash}")
}
