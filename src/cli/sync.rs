//! # Sync Command
//!
//! Runs the sync pipeline for one Terraform resource from this machine.

use anyhow::{bail, Context, Result};
use kube::{api::Api, Client};
use terraform_controller::config::ControllerConfig;
use terraform_controller::constants::DEFAULT_NAMESPACE;
use terraform_controller::crd::{SyncRequest, Terraform};
use terraform_controller::runtime::initialization::build_coordinator;

/// Sync a Terraform resource and print the resulting status
pub async fn sync_command(
    client: Client,
    name: String,
    namespace: Option<String>,
    destroy: bool,
) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
    let api: Api<Terraform> = Api::namespaced(client.clone(), ns);

    let resource = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get Terraform '{ns}/{name}'"))?;

    let mut request = SyncRequest::from_resource(&resource);
    request.finalizing |= destroy;

    let config = ControllerConfig::from_env();
    let coordinator = build_coordinator(client, &config);

    println!(
        "Syncing Terraform '{ns}/{name}' ({} script)...",
        if request.finalizing { "destroy" } else { "deploy" }
    );
    let status = coordinator.sync(&request).await;

    println!("State: {}", status.state);
    println!("Message: {}", status.message);

    if !status.is_success() {
        bail!("Sync of '{ns}/{name}' did not succeed");
    }
    Ok(())
}
