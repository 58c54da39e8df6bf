//! # Terraform Controller
//!
//! A Kubernetes controller that reconciles `Terraform` resources.
//!
//! ## Overview
//!
//! For every resource the controller:
//!
//! 1. **Selects a script** - `deploy` normally, `destroy` while the resource is finalizing
//! 2. **Sets up the backend** - e.g. an S3 bucket and DynamoDB lock table for `provider: aws`
//! 3. **Builds an image** - kaniko builds the git repository with a generated Dockerfile
//! 4. **Runs the script** - in a pod using that image, retried with a fixed delay
//! 5. **Reports status** - `Success`, `Failed` or `error` with a message
//!
//! Syncs are triggered through the `/sync` webhook and, as a backstop, by a
//! periodic pass over every resource in the cluster.

use anyhow::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use terraform_controller::runtime::initialization::initialize;
use terraform_controller::runtime::scheduler::{KubeResourceLister, ReconcileScheduler};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let scheduler = ReconcileScheduler::new(
        Arc::new(KubeResourceLister::new(init.client.clone())),
        init.coordinator.clone(),
        init.controller_config.reconcile_interval(),
        init.controller_config.max_concurrent_syncs,
    );

    let server_state = init.server_state.clone();
    tokio::select! {
        () = scheduler.run(server_state.is_ready.clone()) => {}
        signal = shutdown_signal() => {
            info!("Received shutdown signal ({}), initiating graceful shutdown...", signal?);
            server_state.is_ready.store(false, Ordering::Relaxed);
        }
    }

    info!("Controller stopped");
    Ok(())
}

/// Resolves with the name of the first SIGINT or SIGTERM received
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT").map_err(Into::into),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
