//! # Controller
//!
//! The sync pipeline and its collaborators.
//!
//! - `backend`: remote-state backend providers and their registry
//! - `retry`: bounded fixed-delay retry
//! - `status`: writes sync outcomes back to the resource
//! - `sync`: the per-resource sync pipeline
//! - `workload`: build/run pods and their supporting objects

pub mod backend;
pub mod retry;
pub mod status;
pub mod sync;
pub mod workload;
