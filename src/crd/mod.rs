//! # Custom Resource Definitions
//!
//! Resource types for the Terraform controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Terraform` custom resource and its spec
//! - `status.rs` - Status written back after every sync
//! - `request.rs` - Sync request shape accepted by the webhook

mod request;
mod spec;
mod status;

pub use request::{ParentResource, SyncRequest};
pub use spec::{ContainerRegistry, GitRepo, Scripts, Terraform, TerraformSpec};
pub use status::{SyncState, TerraformStatus};
