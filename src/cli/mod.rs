//! # TFCTL CLI
//!
//! Command-line interface for the Terraform Controller.
//!
//! ## Usage
//!
//! ```bash
//! # List all Terraform resources
//! tfctl list
//!
//! # Show status of a Terraform resource
//! tfctl status my-vpc --namespace infra
//!
//! # Run one sync for a Terraform resource from this machine
//! tfctl sync my-vpc --namespace infra
//!
//! # Run the destroy script instead of deploy
//! tfctl sync my-vpc --namespace infra --destroy
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;
use terraform_controller::runtime::initialization::{init_tracing, install_crypto_provider};

mod list;
mod status;
mod sync;

/// Terraform Controller CLI
#[derive(Parser)]
#[command(name = "tfctl")]
#[command(
    about = "Terraform Controller CLI",
    long_about = None,
    after_help = "\
Examples:
  tfctl list
  tfctl status my-vpc --namespace infra
  tfctl sync my-vpc --namespace infra
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to all namespaces for list, `default` otherwise)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List Terraform resources and their last sync state
    List,
    /// Show spec and status of a Terraform resource
    Status {
        /// Name of the Terraform resource
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Run the full sync pipeline for one Terraform resource and write its status
    ///
    /// Uses the same environment variables as the controller
    /// (CONTAINER_REGISTRY_SECRET, GIT_SSH_SECRET, RUN_MAX_ATTEMPTS, ...).
    Sync {
        /// Name of the Terraform resource
        #[arg(value_name = "NAME")]
        name: String,

        /// Run the destroy script instead of deploy
        #[arg(long)]
        destroy: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_crypto_provider()?;
    init_tracing("text");

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List => list::list_command(client, cli.namespace).await,
        Commands::Status { name } => status::status_command(client, name, cli.namespace).await,
        Commands::Sync { name, destroy } => {
            sync::sync_command(client, name, cli.namespace, destroy).await
        }
    }
}
