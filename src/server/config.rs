//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// HTTP server configuration.
///
/// Passed through to the listener as-is; the router never looks at it.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The size of each read from a connection.
    pub read_buffer_size: usize,
    /// The largest request (headers and body) accepted before answering 413.
    pub max_request_size: usize,
    /// How long shutdown waits for in-flight connections.
    ///
    /// Connections still open after this are aborted. A handler chain that
    /// was already running keeps running to completion on its own task, but
    /// its response is never written.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Listen on every interface at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            max_request_size: 1024 * 1024,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}
