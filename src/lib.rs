#![forbid(unsafe_code)]

//! Local supervisor for agent servers.
//!
//! Launches an agent server as a child process on an ephemeral loopback
//! port, waits for its health endpoint, and guards the managed resource with
//! a pid lock file so only one supervisor manages it at a time.

pub mod client;
pub mod config;
pub mod errors;
pub mod identity;
pub mod lock;
pub mod models;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use errors::{AppError, Result};
