//! Child process supervision.
//!
//! Covers ephemeral port allocation, process launching, readiness probing,
//! abort signals, the per-coordinator task queue, and the lifecycle
//! coordinator composing them.

pub mod abort;
pub mod coordinator;
pub mod health;
pub mod launcher;
pub mod output;
pub mod port;
pub mod queue;

pub use abort::{AbortScope, AbortSignal};
pub use coordinator::{AgentHandle, LaunchSpec, LifecycleCoordinator};
pub use health::{BackoffPolicy, HealthCheck, HealthProbe};
pub use launcher::ProcessSpec;
