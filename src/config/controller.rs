//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;
use zeroize::Zeroizing;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Clone)]
pub struct ControllerConfig {
    /// Interval between periodic reconcile passes (seconds)
    pub reconcile_interval_secs: u64,
    /// Maximum syncs the scheduler runs at the same time
    pub max_concurrent_syncs: usize,
    /// Apply/destroy attempts before a sync is reported as Failed
    pub run_max_attempts: u32,
    /// Delay between apply/destroy attempts (seconds)
    pub run_retry_delay_secs: u64,
    /// How long to wait for a replaced pod to be removed (seconds)
    pub pod_deletion_timeout_secs: u64,
    /// How long a build pod may run (seconds)
    pub build_timeout_secs: u64,
    /// How long a run pod may run (seconds)
    pub run_timeout_secs: u64,
    /// Kaniko executor image
    pub kaniko_image: String,
    /// Image used to clone the git repository
    pub git_clone_image: String,
    /// Base image of the rendered Dockerfile
    pub terraform_base_image: String,
    /// Storage requested for the kaniko cache claim
    pub cache_storage_size: String,
    /// Storage class for the kaniko cache claim (cluster default when unset)
    pub cache_storage_class: Option<String>,
    /// Name of the Secret holding the git SSH private key (`ssh-privatekey` entry)
    pub git_ssh_secret: Option<String>,
    /// Base64-encoded docker config JSON used to push and pull images
    pub container_registry_secret: Zeroizing<String>,
    /// Log format (json, text)
    pub log_format: String,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("reconcile_interval_secs", &self.reconcile_interval_secs)
            .field("max_concurrent_syncs", &self.max_concurrent_syncs)
            .field("run_max_attempts", &self.run_max_attempts)
            .field("run_retry_delay_secs", &self.run_retry_delay_secs)
            .field("git_ssh_secret", &self.git_ssh_secret)
            .field("container_registry_secret", &"***")
            .finish_non_exhaustive()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            max_concurrent_syncs: DEFAULT_MAX_CONCURRENT_SYNCS,
            run_max_attempts: DEFAULT_RUN_MAX_ATTEMPTS,
            run_retry_delay_secs: DEFAULT_RUN_RETRY_DELAY_SECS,
            pod_deletion_timeout_secs: DEFAULT_POD_DELETION_TIMEOUT_SECS,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            kaniko_image: DEFAULT_KANIKO_IMAGE.to_string(),
            git_clone_image: DEFAULT_GIT_CLONE_IMAGE.to_string(),
            terraform_base_image: DEFAULT_TERRAFORM_BASE_IMAGE.to_string(),
            cache_storage_size: DEFAULT_CACHE_STORAGE_SIZE.to_string(),
            cache_storage_class: None,
            git_ssh_secret: None,
            container_registry_secret: Zeroizing::new(String::new()),
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            reconcile_interval_secs: env_var_or_default(
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
            ),
            max_concurrent_syncs: env_var_or_default(
                "MAX_CONCURRENT_SYNCS",
                DEFAULT_MAX_CONCURRENT_SYNCS,
            )
            .max(1),
            run_max_attempts: env_var_or_default("RUN_MAX_ATTEMPTS", DEFAULT_RUN_MAX_ATTEMPTS)
                .max(1),
            run_retry_delay_secs: env_var_or_default(
                "RUN_RETRY_DELAY_SECS",
                DEFAULT_RUN_RETRY_DELAY_SECS,
            ),
            pod_deletion_timeout_secs: env_var_or_default(
                "POD_DELETION_TIMEOUT_SECS",
                DEFAULT_POD_DELETION_TIMEOUT_SECS,
            ),
            build_timeout_secs: env_var_or_default("BUILD_TIMEOUT_SECS", DEFAULT_BUILD_TIMEOUT_SECS),
            run_timeout_secs: env_var_or_default("RUN_TIMEOUT_SECS", DEFAULT_RUN_TIMEOUT_SECS),
            kaniko_image: env_var_or_default_str("KANIKO_IMAGE", DEFAULT_KANIKO_IMAGE),
            git_clone_image: env_var_or_default_str("GIT_CLONE_IMAGE", DEFAULT_GIT_CLONE_IMAGE),
            terraform_base_image: env_var_or_default_str(
                "TERRAFORM_BASE_IMAGE",
                DEFAULT_TERRAFORM_BASE_IMAGE,
            ),
            cache_storage_size: env_var_or_default_str(
                "CACHE_STORAGE_SIZE",
                DEFAULT_CACHE_STORAGE_SIZE,
            ),
            cache_storage_class: env_var_non_empty("CACHE_STORAGE_CLASS"),
            git_ssh_secret: env_var_non_empty("GIT_SSH_SECRET"),
            container_registry_secret: Zeroizing::new(env_var_or_default_str(
                "CONTAINER_REGISTRY_SECRET",
                "",
            )),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
        }
    }

    /// Get the periodic reconcile interval
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Get the delay between apply/destroy attempts
    pub fn run_retry_delay(&self) -> Duration {
        Duration::from_secs(self.run_retry_delay_secs)
    }

    /// Get the pod deletion wait bound
    pub fn pod_deletion_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_deletion_timeout_secs)
    }

    /// Get the build pod timeout
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// Get the run pod timeout
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read environment variable, treating an empty value as unset
fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
