//! Domain model module declarations.

pub mod endpoint;
pub mod health;
pub mod lifecycle;
pub mod lock;
pub mod process;
