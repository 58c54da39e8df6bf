//! # Runtime
//!
//! Process wiring around the sync pipeline.
//!
//! - `initialization`: rustls, tracing, metrics, client and server startup
//! - `scheduler`: periodic reconcile of every resource
//! - `server`: sync webhook, probes and metrics endpoint

pub mod initialization;
pub mod scheduler;
pub mod server;
