//! Address of a supervised agent server.

use serde::{Deserialize, Serialize};

/// Loopback endpoint the child process listens on.
///
/// Derived once port allocation succeeds and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentEndpoint {
    /// Host the child binds to (injected as `HOST`).
    pub host: String,
    /// Port the child binds to (injected as `PORT`).
    pub port: u16,
    /// `http://{host}:{port}` without a trailing slash.
    pub base_url: String,
}

impl AgentEndpoint {
    /// Build an endpoint for a host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let base_url = format!("http://{host}:{port}");
        Self {
            host,
            port,
            base_url,
        }
    }
}
