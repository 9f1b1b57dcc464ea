//! Shared constants: protocol error codes, header names, and tuning knobs.

/// JSON-RPC 2.0 protocol constants.
pub mod jsonrpc {
    /// The only accepted protocol version string.
    pub const VERSION: &str = "2.0";
}

/// Session identity on the wire.
pub mod session {
    /// Header carrying the Streamable HTTP session id.
    pub const SESSION_ID_HEADER: &str = "mcp-session-id";
    /// Query parameter carrying the SSE companion-POST session id.
    pub const SESSION_ID_QUERY: &str = "session_id";
}

/// SSE event names used by the MCP SSE transport.
pub mod sse {
    /// First event on an SSE stream: the companion POST endpoint URL.
    pub const ENDPOINT_EVENT: &str = "endpoint";
    /// Every subsequent event: one JSON-RPC message.
    pub const MESSAGE_EVENT: &str = "message";
}

/// Tuning limits.
pub mod limits {
    use std::time::Duration;

    /// Per-direction message queue depth. Queue-full blocks the producing
    /// pump, which is the backpressure path.
    pub const CHANNEL_CAPACITY: usize = 64;
    /// Grace period between closing a child's stdin and escalating to kill.
    pub const KILL_GRACE: Duration = Duration::from_secs(5);
    /// Bounded wait for a correlated response on a Streamable HTTP POST.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}
