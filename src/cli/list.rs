//! # List Command
//!
//! Command to list all Terraform resources.

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use terraform_controller::crd::Terraform;

/// List all Terraform resources
pub async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<Terraform> = if let Some(ns) = &namespace {
        println!("Listing Terraform resources in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing Terraform resources in all namespaces...");
        Api::all(client)
    };

    let resources = api
        .list(&kube::api::ListParams::default())
        .await
        .context("Failed to list Terraform resources")?;

    if resources.items.is_empty() {
        println!("No Terraform resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<10} {:<12} {:<40}",
        "NAME", "NAMESPACE", "STATE", "FINALIZING", "MESSAGE"
    );
    println!("{}", "-".repeat(112));

    for resource in resources.items {
        let name = resource.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = resource.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let finalizing = if resource.metadata.deletion_timestamp.is_some() {
            "Yes"
        } else {
            "No"
        };

        let (state, message) = resource.status.as_ref().map_or(("-", "-"), |s| {
            (s.state.as_str(), s.message.as_str())
        });

        println!("{name:<30} {ns:<20} {state:<10} {finalizing:<12} {message:<40}");
    }

    Ok(())
}
