// Main entry point for the mcp-bridge proxy.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mcp_bridge::api;
use mcp_bridge::client;
use mcp_bridge::config::{self, ProxySettings};
use mcp_bridge::registry::BackendDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// SSE with a companion POST endpoint.
    Sse,
    /// Single-endpoint Streamable HTTP.
    Streamablehttp,
}

/// Bridge MCP transports: expose a remote SSE/Streamable HTTP server over
/// stdio, or expose local stdio servers over HTTP.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Command or URL to connect to. An http(s) URL selects client mode;
    /// anything else is the command for the default stdio server.
    command_or_url: Option<String>,

    /// Extra arguments for the default server command (everything after
    /// `--` is passed through verbatim).
    args: Vec<String>,

    /// Header for the remote server in client mode. Repeatable.
    #[arg(
        short = 'H',
        long = "headers",
        num_args = 2,
        value_names = ["KEY", "VALUE"],
        action = ArgAction::Append
    )]
    headers: Vec<String>,

    /// Client transport to use against the remote URL.
    #[arg(long, value_enum, default_value_t = TransportKind::Sse)]
    transport: TransportKind,

    /// Environment variable for the default server. Repeatable.
    #[arg(
        short = 'e',
        long = "env",
        num_args = 2,
        value_names = ["KEY", "VALUE"],
        action = ArgAction::Append
    )]
    env: Vec<String>,

    /// Working directory for the default server.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Pass the parent environment through to spawned servers.
    #[arg(long, overrides_with = "no_pass_environment")]
    pass_environment: bool,
    #[arg(long = "no-pass-environment", hide = true)]
    no_pass_environment: bool,

    /// Enable debug logging.
    #[arg(long, overrides_with = "no_debug")]
    debug: bool,
    #[arg(long = "no-debug", hide = true)]
    no_debug: bool,

    /// Define a named stdio server: NAME is the URL path under
    /// /servers/NAME/, COMMAND_STRING is shell-split into command + args.
    /// Repeatable. Ignored when --named-server-config is set.
    #[arg(
        long = "named-server",
        num_args = 2,
        value_names = ["NAME", "COMMAND_STRING"],
        action = ArgAction::Append
    )]
    named_server: Vec<String>,

    /// JSON config file for named servers; the exclusive source when set.
    #[arg(long = "named-server-config", value_name = "FILE_PATH")]
    named_server_config: Option<PathBuf>,

    /// Port to listen on in server mode (0 picks a random free port).
    #[arg(long, visible_alias = "sse-port", default_value_t = 0)]
    port: u16,

    /// Address to bind in server mode.
    #[arg(long, visible_alias = "sse-host", default_value = "127.0.0.1")]
    host: String,

    /// Stateless Streamable HTTP: one fresh child per POST, no session.
    #[arg(long, overrides_with = "no_stateless")]
    stateless: bool,
    #[arg(long = "no-stateless", hide = true)]
    no_stateless: bool,

    /// CORS allow-list; empty means no CORS headers at all.
    #[arg(long = "allow-origin", num_args = 1.., value_name = "ORIGIN")]
    allow_origin: Vec<String>,
}

fn pairs(flat: &[String]) -> Vec<(String, String)> {
    flat.chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let is_url = cli
        .command_or_url
        .as_deref()
        .is_some_and(|c| c.starts_with("http://") || c.starts_with("https://"));

    if is_url {
        return run_client(cli, shutdown).await;
    }
    run_server(cli, shutdown).await
}

/// Client mode: parent stdio on one side, the remote URL on the other.
async fn run_client(cli: Cli, shutdown: CancellationToken) -> anyhow::Result<()> {
    if !cli.named_server.is_empty() || cli.named_server_config.is_some() {
        warn!("named server definitions are ignored in client mode");
    }
    let url = cli.command_or_url.as_deref().unwrap_or_default();
    let headers = client::build_headers(&pairs(&cli.headers))?;

    info!(url = %url, transport = ?cli.transport, "starting client-mode bridge");
    match cli.transport {
        TransportKind::Sse => client::run_sse_client(url, headers, shutdown).await?,
        TransportKind::Streamablehttp => {
            client::run_streamablehttp_client(url, headers, shutdown).await?
        }
    }
    Ok(())
}

/// Server mode: spawn stdio children per session and serve them over HTTP.
async fn run_server(cli: Cli, shutdown: CancellationToken) -> anyhow::Result<()> {
    if cli.command_or_url.is_none()
        && cli.named_server.is_empty()
        && cli.named_server_config.is_none()
    {
        anyhow::bail!(
            "either a command_or_url for a default server or at least one \
             --named-server (or --named-server-config) must be provided"
        );
    }

    let base_env: HashMap<String, String> = if cli.pass_environment {
        std::env::vars().collect()
    } else {
        HashMap::new()
    };

    let default = cli.command_or_url.as_ref().map(|command| {
        let mut env = base_env.clone();
        env.extend(pairs(&cli.env));
        info!(command = %command, args = ?cli.args, "configured default server");
        BackendDescriptor {
            name: String::new(),
            command: command.clone(),
            args: cli.args.clone(),
            env,
            cwd: cli.cwd.clone(),
        }
    });

    let registry = config::assemble_registry(
        default,
        cli.named_server_config.as_deref(),
        &pairs(&cli.named_server),
        &base_env,
    )
    .context("failed to load server configuration")?;

    if registry.is_empty() {
        anyhow::bail!("no stdio servers configured");
    }

    let settings = ProxySettings {
        host: cli.host.clone(),
        port: cli.port,
        stateless: cli.stateless,
        allow_origins: cli.allow_origin.clone(),
    };

    api::serve(settings, registry, shutdown)
        .await
        .context("server failed")?;
    Ok(())
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_directive = if debug { "mcp_bridge=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // stdout carries protocol frames in client mode, so logs go to stderr.
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_invocation() {
        let cli = Cli::parse_from([
            "mcp-bridge",
            "--transport",
            "streamablehttp",
            "-H",
            "Authorization",
            "Bearer t",
            "http://localhost:8080/mcp",
        ]);
        assert_eq!(cli.transport, TransportKind::Streamablehttp);
        assert_eq!(
            cli.command_or_url.as_deref(),
            Some("http://localhost:8080/mcp")
        );
        assert_eq!(
            pairs(&cli.headers),
            vec![("Authorization".to_string(), "Bearer t".to_string())]
        );
    }

    #[test]
    fn parses_server_invocation_with_trailing_args() {
        let cli = Cli::parse_from([
            "mcp-bridge",
            "--port",
            "8080",
            "my-server",
            "--",
            "--flag",
            "value",
        ]);
        assert_eq!(cli.command_or_url.as_deref(), Some("my-server"));
        assert_eq!(cli.args, vec!["--flag", "value"]);
        assert_eq!(cli.port, 8080);
    }

    #[test]
    fn sse_port_alias_works() {
        let cli = Cli::parse_from(["mcp-bridge", "--sse-port", "9000", "cmd"]);
        assert_eq!(cli.port, 9000);
        let cli = Cli::parse_from(["mcp-bridge", "--sse-host", "0.0.0.0", "cmd"]);
        assert_eq!(cli.host, "0.0.0.0");
    }

    #[test]
    fn negation_flags_override() {
        let cli = Cli::parse_from(["mcp-bridge", "--stateless", "--no-stateless", "cmd"]);
        assert!(!cli.stateless);
        let cli = Cli::parse_from(["mcp-bridge", "--debug", "cmd"]);
        assert!(cli.debug);
    }

    #[test]
    fn named_servers_accumulate() {
        let cli = Cli::parse_from([
            "mcp-bridge",
            "--named-server",
            "fetch",
            "uvx mcp-server-fetch",
            "--named-server",
            "git",
            "uvx mcp-server-git",
        ]);
        let defs = pairs(&cli.named_server);
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].0, "fetch");
        assert_eq!(defs[1].1, "uvx mcp-server-git");
    }

    #[test]
    fn allow_origin_collects_multiple_values() {
        let cli = Cli::parse_from([
            "mcp-bridge",
            "--allow-origin",
            "https://a.com",
            "https://b.com",
            "--",
            "cmd",
        ]);
        assert_eq!(cli.allow_origin, vec!["https://a.com", "https://b.com"]);
    }
}
