//! Ephemeral port allocation.
//!
//! The OS picks a free port for a listener bound to port 0; the listener is
//! dropped before the port is handed out. Another process may claim the
//! port between the drop and the child's own bind. That race is accepted:
//! closing it would need an OS-level reservation that is not available.

use tokio::net::TcpListener;
use tracing::debug;

use crate::{AppError, Result};

/// Obtain a currently unused TCP port on `host`.
///
/// # Errors
///
/// Returns `AppError::Io` if no listener can be bound on `host`.
pub async fn allocate_port(host: &str) -> Result<u16> {
    let listener = TcpListener::bind((host, 0))
        .await
        .map_err(|err| AppError::Io(format!("failed to bind ephemeral port on {host}: {err}")))?;
    let port = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("failed to read ephemeral port: {err}")))?
        .port();
    drop(listener);
    debug!(host, port, "allocated ephemeral port");
    Ok(port)
}
