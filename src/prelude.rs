//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use terraform_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (Terraform, SyncRequest, TerraformStatus, etc.)
//! - The sync pipeline and its seams (SyncCoordinator, ClusterApi, StatusReporter)
//! - Backend provider types (BackendProvider, BackendRegistry)
//! - Config types (ControllerConfig, ServerConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Backend providers - needed for implementing backends
pub use crate::controller::backend::{BackendError, BackendProvider, BackendRegistry, BackendSetup};

// Sync pipeline
pub use crate::controller::retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use crate::controller::status::{KubeStatusReporter, StatusReporter};
pub use crate::controller::sync::{ScriptAction, SyncCoordinator, SyncError, SyncStage};
pub use crate::controller::workload::{
    ClusterApi, KubeClusterApi, PodLifecycleManager, PodOutcome, ResourceRef, UnitRole,
    WorkloadError, WorkloadSettings,
};

// Runtime
pub use crate::runtime::scheduler::{KubeResourceLister, ReconcileScheduler, ResourceLister};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, ServerConfig};
