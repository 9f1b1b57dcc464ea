//! Configuration assembly: server settings and named-backend definitions
//! from the JSON config file or CLI flags.
//!
//! The JSON file, when present, is the exclusive source of named servers;
//! CLI `--named-server` definitions are then discarded with a warning.
//! Individual bad entries in the file are skipped with a warning, while a
//! structurally broken file is fatal.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::core::errors::ProxyError;
use crate::registry::{BackendDescriptor, BackendRegistry};

/// HTTP server settings (server mode).
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub host: String,
    /// 0 requests a random free port.
    pub port: u16,
    pub stateless: bool,
    pub allow_origins: Vec<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            stateless: false,
            allow_origins: Vec::new(),
        }
    }
}

/// Build the registry from its three (mutually exclusive for named servers)
/// sources.
pub fn assemble_registry(
    default: Option<BackendDescriptor>,
    config_path: Option<&Path>,
    cli_definitions: &[(String, String)],
    base_env: &HashMap<String, String>,
) -> Result<BackendRegistry, ProxyError> {
    let named = if let Some(path) = config_path {
        if !cli_definitions.is_empty() {
            warn!("--named-server definitions are ignored because --named-server-config is set");
        }
        load_named_servers_from_file(path, base_env)?
    } else {
        named_servers_from_cli(cli_definitions, base_env)
    };
    Ok(BackendRegistry::new(default, named))
}

/// Load named server descriptors from a JSON config file.
pub fn load_named_servers_from_file(
    path: &Path,
    base_env: &HashMap<String, String>,
) -> Result<Vec<BackendDescriptor>, ProxyError> {
    info!(path = %path.display(), "loading named server configuration");
    let text = std::fs::read_to_string(path).map_err(|e| {
        ProxyError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_named_servers(&text, base_env)
}

/// Parse the `mcpServers` document. Only `command`, `args` and `enabled`
/// are honoured; `timeout`, `transportType` and unknown fields are ignored
/// (the transport is always stdio).
pub fn parse_named_servers(
    text: &str,
    base_env: &HashMap<String, String>,
) -> Result<Vec<BackendDescriptor>, ProxyError> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| ProxyError::ConfigInvalid(format!("config is not valid JSON: {e}")))?;
    let servers = root
        .get("mcpServers")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            ProxyError::ConfigInvalid("config is missing the 'mcpServers' object".to_string())
        })?;

    let mut out = Vec::new();
    for (name, entry) in servers {
        let Some(entry) = entry.as_object() else {
            warn!(server = %name, "skipping: entry is not an object");
            continue;
        };
        if !entry.get("enabled").and_then(Value::as_bool).unwrap_or(true) {
            info!(server = %name, "named server is disabled, skipping");
            continue;
        }
        let Some(command) = entry.get("command").and_then(Value::as_str) else {
            warn!(server = %name, "skipping: missing 'command'");
            continue;
        };
        let args = match entry.get("args") {
            None => Vec::new(),
            Some(Value::Array(items)) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect();
                match strings {
                    Some(args) => args,
                    None => {
                        warn!(server = %name, "skipping: 'args' must be a list of strings");
                        continue;
                    }
                }
            }
            Some(_) => {
                warn!(server = %name, "skipping: 'args' must be a list");
                continue;
            }
        };
        info!(server = %name, command = %command, "configured named server from file");
        out.push(BackendDescriptor {
            name: name.clone(),
            command: command.to_string(),
            args,
            env: base_env.clone(),
            cwd: None,
        });
    }
    Ok(out)
}

/// Parse repeated `--named-server NAME COMMAND_STRING` definitions. The
/// command string is split with POSIX shell quoting rules. A later
/// definition of the same name replaces the earlier one.
pub fn named_servers_from_cli(
    definitions: &[(String, String)],
    base_env: &HashMap<String, String>,
) -> Vec<BackendDescriptor> {
    let mut out: Vec<BackendDescriptor> = Vec::new();
    for (name, command_string) in definitions {
        let parts = match shell_words::split(command_string) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(server = %name, error = %e, "skipping: unparsable command string");
                continue;
            }
        };
        let Some((command, args)) = parts.split_first() else {
            warn!(server = %name, "skipping: empty command string");
            continue;
        };
        let desc = BackendDescriptor {
            name: name.clone(),
            command: command.clone(),
            args: args.to_vec(),
            env: base_env.clone(),
            cwd: None,
        };
        if let Some(existing) = out.iter_mut().find(|d| d.name == *name) {
            warn!(server = %name, "redefined on the command line, last definition wins");
            *existing = desc;
        } else {
            info!(server = %name, command = %command_string, "configured named server");
            out.push(desc);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> HashMap<String, String> {
        HashMap::from([("PATH".to_string(), "/usr/bin".to_string())])
    }

    #[test]
    fn parses_minimal_config() {
        let servers = parse_named_servers(
            r#"{"mcpServers": {"fetch": {"command": "uvx", "args": ["mcp-server-fetch"]}}}"#,
            &env(),
        )
        .unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "fetch");
        assert_eq!(servers[0].command, "uvx");
        assert_eq!(servers[0].args, vec!["mcp-server-fetch"]);
        assert_eq!(servers[0].env, env());
        assert!(servers[0].cwd.is_none());
    }

    #[test]
    fn skips_disabled_servers() {
        let servers = parse_named_servers(
            r#"{"mcpServers": {
                "on": {"command": "a"},
                "off": {"command": "b", "enabled": false}
            }}"#,
            &env(),
        )
        .unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "on");
    }

    #[test]
    fn skips_entries_missing_command() {
        let servers = parse_named_servers(
            r#"{"mcpServers": {"bad": {"args": ["x"]}, "good": {"command": "c"}}}"#,
            &env(),
        )
        .unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "good");
    }

    #[test]
    fn skips_entries_with_bad_args() {
        let servers = parse_named_servers(
            r#"{"mcpServers": {"bad": {"command": "c", "args": "not-a-list"}}}"#,
            &env(),
        )
        .unwrap();
        assert!(servers.is_empty());
    }

    #[test]
    fn ignores_unknown_fields() {
        let servers = parse_named_servers(
            r#"{"mcpServers": {"s": {
                "command": "c", "timeout": 60, "transportType": "stdio", "future": {}
            }}}"#,
            &env(),
        )
        .unwrap();
        assert_eq!(servers.len(), 1);
    }

    #[test]
    fn missing_mcp_servers_key_is_fatal() {
        let err = parse_named_servers(r#"{"servers": {}}"#, &env()).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigInvalid(_)));
    }

    #[test]
    fn invalid_json_is_fatal() {
        let err = parse_named_servers("{not json", &env()).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigInvalid(_)));
    }

    #[test]
    fn cli_definitions_split_like_a_shell() {
        let servers = named_servers_from_cli(
            &[(
                "fetch".to_string(),
                "uvx mcp-server-fetch --timeout '10 s'".to_string(),
            )],
            &env(),
        );
        assert_eq!(servers[0].command, "uvx");
        assert_eq!(
            servers[0].args,
            vec!["mcp-server-fetch", "--timeout", "10 s"]
        );
    }

    #[test]
    fn cli_empty_command_is_skipped() {
        let servers = named_servers_from_cli(&[("x".to_string(), "  ".to_string())], &env());
        assert!(servers.is_empty());
    }

    #[test]
    fn cli_duplicate_name_last_wins() {
        let servers = named_servers_from_cli(
            &[
                ("s".to_string(), "first".to_string()),
                ("s".to_string(), "second".to_string()),
            ],
            &env(),
        );
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].command, "second");
    }
}
