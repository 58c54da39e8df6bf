//! # CRD Generator
//!
//! Generates the `Terraform` CustomResourceDefinition YAML from the Rust types.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/terraform.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use terraform_controller::crd::Terraform;

fn main() {
    let crd = Terraform::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the types in src/crd/ and regenerate instead");
            println!("#");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
