//! Terraform Controller Library
//!
//! Reconciles `Terraform` resources by building an image from the resource's
//! git repository and running its deploy or destroy script in a pod, then
//! writing the outcome back to the resource status.
//!
//! ## Quick Start
//!
//! ```rust
//! use terraform_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
