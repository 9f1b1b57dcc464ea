// Domain error types for the bridge.

use thiserror::Error;

/// Main error type for the proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Bytes that do not parse as JSON at all.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Parsed JSON that violates the JSON-RPC 2.0 message shape.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A backend child process could not be started.
    #[error("failed to spawn backend '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    /// The peer side of a transport is gone.
    #[error("transport closed")]
    TransportClosed,

    /// The remote HTTP endpoint misbehaved (bad status, broken stream).
    #[error("upstream HTTP error: {0}")]
    UpstreamHttp(String),

    /// No backend is registered for the requested route.
    #[error("no backend registered for '{0}'")]
    RouteNotFound(String),

    /// Startup configuration is unusable.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The listen socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Normal completion of a session under shutdown. Not surfaced to users.
    #[error("cancelled")]
    Cancelled,

    /// I/O error from a transport pump.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Short machine-friendly kind tag, used in teardown logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedFrame(_) => "malformed_frame",
            ProxyError::SchemaViolation(_) => "schema_violation",
            ProxyError::SpawnFailed { .. } => "spawn_failed",
            ProxyError::TransportClosed => "transport_closed",
            ProxyError::UpstreamHttp(_) => "upstream_http",
            ProxyError::RouteNotFound(_) => "route_not_found",
            ProxyError::ConfigInvalid(_) => "config_invalid",
            ProxyError::BindFailed { .. } => "bind_failed",
            ProxyError::Cancelled => "cancelled",
            ProxyError::Io(_) => "io",
        }
    }
}
