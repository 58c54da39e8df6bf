//! # Configuration
//!
//! Process-level configuration, read once at startup from the environment.
//!
//! - `controller.rs` - reconcile cadence, retry policy, pod images and timeouts,
//!   process-supplied credentials
//! - `server.rs` - HTTP server port and startup polling

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;
