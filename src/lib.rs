//! mcp-bridge: a bidirectional transport bridge for the Model Context
//! Protocol (MCP).
//!
//! In client mode the process speaks stdio-MCP towards its parent and acts
//! as an MCP client against a remote SSE or Streamable HTTP endpoint. In
//! server mode it listens on TCP, routes HTTP sessions to named stdio
//! backends, and spawns one child process per session.

pub mod api;
pub mod client;
pub mod config;
pub mod constants;
pub mod core;
pub mod mcp;
pub mod registry;
