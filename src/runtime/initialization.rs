//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! Kubernetes client setup, sync pipeline wiring and server startup.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::backend::BackendRegistry;
use crate::controller::retry::RetryPolicy;
use crate::controller::status::KubeStatusReporter;
use crate::controller::sync::SyncCoordinator;
use crate::controller::workload::{KubeClusterApi, PodLifecycleManager, WorkloadSettings};
use crate::observability;
use crate::runtime::server::{start_server, ServerState};
use anyhow::{anyhow, Context, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "terraform_controller=info";

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Sync pipeline shared by the webhook and the scheduler
    pub coordinator: SyncCoordinator,
    /// Server state for health checks and the sync webhook
    pub server_state: Arc<ServerState>,
    pub controller_config: ControllerConfig,
    pub server_config: ServerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Install the ring crypto provider for rustls
///
/// Must run before the first TLS connection is made.
pub fn install_crypto_provider() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))
}

/// Set up the tracing subscriber
///
/// `RUST_LOG` overrides the default filter. `log_format` selects `text` or JSON
/// (anything else).
pub fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if log_format.eq_ignore_ascii_case("text") {
        builder.try_init()
    } else {
        builder.json().try_init()
    };

    if let Err(e) = result {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Wire the sync pipeline against a cluster
pub fn build_coordinator(client: Client, config: &ControllerConfig) -> SyncCoordinator {
    let workloads = PodLifecycleManager::new(
        Arc::new(KubeClusterApi::new(client.clone())),
        WorkloadSettings::from(config),
    );

    SyncCoordinator::new(
        Arc::new(BackendRegistry::with_defaults()),
        workloads,
        Arc::new(KubeStatusReporter::new(client)),
        RetryPolicy::new(config.run_max_attempts, config.run_retry_delay()),
        config.container_registry_secret.clone(),
    )
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - Kubernetes client creation
/// - Sync pipeline wiring
/// - HTTP server startup
pub async fn initialize() -> Result<InitializationResult> {
    install_crypto_provider()?;

    let controller_config = ControllerConfig::from_env();
    let server_config = ServerConfig::from_env();

    init_tracing(&controller_config.log_format);

    info!("Starting Terraform Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!("Configuration: {:?}", controller_config);

    if controller_config.container_registry_secret.trim().is_empty() {
        warn!("CONTAINER_REGISTRY_SECRET is not set, every sync will fail at the registry secret stage");
    }

    // Initialize metrics
    observability::metrics::register_metrics()?;

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let coordinator = build_coordinator(client.clone(), &controller_config);
    let server_state = Arc::new(ServerState::new(coordinator.clone()));

    // Start server in background task
    let server_state_clone = server_state.clone();
    let server_port = server_config.port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Poll server startup - wait for it to be ready before proceeding
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    info!("Controller initialized, starting reconcile scheduler...");

    Ok(InitializationResult {
        client,
        coordinator,
        server_state,
        controller_config,
        server_config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        // Check if server task crashed
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        // Set by start_server once bound
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
