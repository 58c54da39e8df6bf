//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for the sync webhook, metrics and health probes
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default interval between periodic reconcile passes (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default upper bound on syncs running at the same time from the scheduler
pub const DEFAULT_MAX_CONCURRENT_SYNCS: usize = 10;

/// Default number of apply/destroy attempts before a sync is reported as Failed
pub const DEFAULT_RUN_MAX_ATTEMPTS: u32 = 10;

/// Default delay between apply/destroy attempts (seconds)
pub const DEFAULT_RUN_RETRY_DELAY_SECS: u64 = 60;

/// Default time to wait for a replaced pod to disappear before recreating it (seconds)
pub const DEFAULT_POD_DELETION_TIMEOUT_SECS: u64 = 120;

/// Default time a build pod may take to reach a terminal phase (seconds)
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 1800;

/// Default time a run pod may take to reach a terminal phase (seconds)
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 3600;

/// Image running the kaniko build
pub const DEFAULT_KANIKO_IMAGE: &str = "gcr.io/kaniko-project/executor:v1.23.1-debug";

/// Image used by the init container that checks out the git repository
pub const DEFAULT_GIT_CLONE_IMAGE: &str = "alpine/git:2.45.2";

/// Base image every rendered Dockerfile starts from
pub const DEFAULT_TERRAFORM_BASE_IMAGE: &str = "hashicorp/terraform:1.9";

/// Size requested for the kaniko cache claim
pub const DEFAULT_CACHE_STORAGE_SIZE: &str = "1Gi";

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "terraform-controller";

/// Namespace assumed when a resource carries none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Label key identifying the owning Terraform resource
pub const LABEL_TERRAFORM: &str = "alustan.io/terraform";

/// Label key identifying the execution unit role (build/run)
pub const LABEL_ROLE: &str = "alustan.io/role";

/// Standard managed-by label key
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
