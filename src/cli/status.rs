//! # Status Command
//!
//! Command to show detailed status of a Terraform resource.

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use terraform_controller::constants::DEFAULT_NAMESPACE;
use terraform_controller::controller::backend::PROVIDER_KEY;
use terraform_controller::crd::Terraform;

/// Show detailed status of a Terraform resource
pub async fn status_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);

    println!("Status for Terraform '{ns}/{name}'");
    println!();

    let api: Api<Terraform> = Api::namespaced(client, ns);

    let resource = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get Terraform '{ns}/{name}'"))?;

    println!("Resource Information:");
    println!(
        "  Name: {}",
        resource.metadata.name.as_deref().unwrap_or("<unknown>")
    );
    println!(
        "  Namespace: {}",
        resource.metadata.namespace.as_deref().unwrap_or("<unknown>")
    );
    if let Some(uid) = &resource.metadata.uid {
        println!("  UID: {uid}");
    }
    println!(
        "  Finalizing: {}",
        resource.metadata.deletion_timestamp.is_some()
    );

    let spec = &resource.spec;
    println!();
    println!("Spec:");
    println!("  Git Repository: {}", spec.git_repo.url);
    if !spec.git_repo.branch.is_empty() {
        println!("  Branch: {}", spec.git_repo.branch);
    }
    println!("  Image: {}", spec.container_registry.image_name);
    println!(
        "  Backend Provider: {}",
        spec.backend
            .get(PROVIDER_KEY)
            .map_or("<none>", String::as_str)
    );
    println!("  Deploy Script: {}", or_none(&spec.scripts.deploy));
    println!("  Destroy Script: {}", or_none(&spec.scripts.destroy));
    println!("  Variables: {}", spec.variables.len());

    println!();
    println!("Status:");
    match &resource.status {
        Some(status) => {
            println!("  State: {}", status.state);
            println!("  Message: {}", status.message);
        }
        None => println!("  No sync recorded yet"),
    }

    Ok(())
}

fn or_none(value: &str) -> &str {
    if value.trim().is_empty() {
        "<none>"
    } else {
        value
    }
}
