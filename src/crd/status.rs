//! # Terraform Status
//!
//! The outcome of the most recent sync. Last write wins; no history is kept.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum SyncState {
    /// The deploy/destroy script completed
    Success,
    /// Every apply/destroy attempt failed
    Failed,
    /// The sync stopped before the apply/destroy stage
    #[serde(rename = "error")]
    Error,
}

impl SyncState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Success => "Success",
            SyncState::Failed => "Failed",
            SyncState::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the Terraform resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerraformStatus {
    pub state: SyncState,
    #[serde(default)]
    pub message: String,
}

impl TerraformStatus {
    /// Status for a completed apply/destroy
    #[must_use]
    pub fn success() -> Self {
        Self {
            state: SyncState::Success,
            message: "applied successfully".to_string(),
        }
    }

    /// Status after apply/destroy attempts ran out, carrying the last cause verbatim
    #[must_use]
    pub fn failed(cause: impl fmt::Display) -> Self {
        Self {
            state: SyncState::Failed,
            message: cause.to_string(),
        }
    }

    /// Status for a sync that stopped while `action` was in progress
    #[must_use]
    pub fn error(action: &str, cause: impl fmt::Display) -> Self {
        Self {
            state: SyncState::Error,
            message: format!("error {action}: {cause}"),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == SyncState::Success
    }
}
