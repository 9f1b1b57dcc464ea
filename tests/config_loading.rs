// Registry assembly from config files and CLI definitions.

use std::collections::HashMap;
use std::io::Write;

use tempfile::NamedTempFile;

use mcp_bridge::config::{assemble_registry, load_named_servers_from_file};
use mcp_bridge::core::errors::ProxyError;
use mcp_bridge::registry::BackendDescriptor;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn no_env() -> HashMap<String, String> {
    HashMap::new()
}

#[test]
fn loads_servers_from_file() {
    let file = write_config(
        r#"{
            "mcpServers": {
                "fetch": {"command": "uvx", "args": ["mcp-server-fetch"]},
                "disabled": {"command": "x", "enabled": false}
            }
        }"#,
    );
    let servers = load_named_servers_from_file(file.path(), &no_env()).unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "fetch");
}

#[test]
fn missing_file_is_config_invalid() {
    let err = load_named_servers_from_file(
        std::path::Path::new("/definitely/not/here.json"),
        &no_env(),
    )
    .unwrap_err();
    assert!(matches!(err, ProxyError::ConfigInvalid(_)));
}

#[test]
fn invalid_json_is_config_invalid() {
    let file = write_config("{broken");
    let err = load_named_servers_from_file(file.path(), &no_env()).unwrap_err();
    assert!(matches!(err, ProxyError::ConfigInvalid(_)));
}

#[test]
fn config_file_is_the_exclusive_source_of_named_servers() {
    // A CLI definition of `a` and a config file defining only `b`: the set
    // of resulting backends must be exactly those from the file.
    let file = write_config(r#"{"mcpServers": {"b": {"command": "cmd-b"}}}"#);
    let registry = assemble_registry(
        None,
        Some(file.path()),
        &[("a".to_string(), "cmd-a".to_string())],
        &no_env(),
    )
    .unwrap();

    assert!(registry.lookup("a").is_none());
    assert!(registry.lookup("b").is_some());
    assert_eq!(registry.named().len(), 1);
}

#[test]
fn cli_definitions_apply_without_a_config_file() {
    let registry = assemble_registry(
        None,
        None,
        &[("a".to_string(), "cmd-a --flag".to_string())],
        &no_env(),
    )
    .unwrap();
    let a = registry.lookup("a").unwrap();
    assert_eq!(a.command, "cmd-a");
    assert_eq!(a.args, vec!["--flag"]);
}

#[test]
fn default_server_coexists_with_named_servers() {
    let default = BackendDescriptor {
        name: String::new(),
        command: "my-server".to_string(),
        args: vec!["--stdio".to_string()],
        env: no_env(),
        cwd: None,
    };
    let registry = assemble_registry(
        Some(default),
        None,
        &[("a".to_string(), "cmd-a".to_string())],
        &no_env(),
    )
    .unwrap();
    assert!(registry.default_backend().is_some());
    assert!(registry.lookup("a").is_some());
    assert!(!registry.is_empty());
}

#[test]
fn named_servers_inherit_the_base_environment() {
    let env = HashMap::from([("API_KEY".to_string(), "secret".to_string())]);
    let file = write_config(r#"{"mcpServers": {"s": {"command": "c"}}}"#);
    let registry = assemble_registry(None, Some(file.path()), &[], &env).unwrap();
    assert_eq!(registry.lookup("s").unwrap().env["API_KEY"], "secret");
}
