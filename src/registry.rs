//! Backend registry: the set of stdio servers this proxy can bind
//! sessions to.
//!
//! Descriptors are immutable after startup. Children are spawned per
//! session via [`BackendRegistry::instantiate`]; the registry itself never
//! owns a running process.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::errors::ProxyError;
use crate::mcp::stdio;
use crate::mcp::transport::Transport;

/// Everything needed to spawn one stdio backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    /// URL-safe name; empty string for the default (unnamed) server.
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// The child's entire environment.
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BackendRegistry {
    default: Option<BackendDescriptor>,
    named: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    pub fn new(default: Option<BackendDescriptor>, named: Vec<BackendDescriptor>) -> Self {
        Self { default, named }
    }

    pub fn default_backend(&self) -> Option<&BackendDescriptor> {
        self.default.as_ref()
    }

    pub fn lookup(&self, name: &str) -> Option<&BackendDescriptor> {
        self.named.iter().find(|d| d.name == name)
    }

    /// Resolve a route: `None` targets the default server.
    pub fn resolve(&self, name: Option<&str>) -> Result<&BackendDescriptor, ProxyError> {
        match name {
            None => self
                .default_backend()
                .ok_or_else(|| ProxyError::RouteNotFound("/".to_string())),
            Some(name) => self
                .lookup(name)
                .ok_or_else(|| ProxyError::RouteNotFound(format!("servers/{name}"))),
        }
    }

    /// Named descriptors in registration order.
    pub fn named(&self) -> &[BackendDescriptor] {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.named.is_empty()
    }

    /// Spawn a fresh child for `desc` and hand back its transport.
    pub fn instantiate(&self, desc: &BackendDescriptor) -> Result<Transport, ProxyError> {
        stdio::spawn_backend(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> BackendDescriptor {
        BackendDescriptor {
            name: name.to_string(),
            command: "cmd".to_string(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
        }
    }

    #[test]
    fn lookup_finds_named_backends() {
        let reg = BackendRegistry::new(None, vec![desc("fetch"), desc("git")]);
        assert!(reg.lookup("fetch").is_some());
        assert!(reg.lookup("git").is_some());
        assert!(reg.lookup("missing").is_none());
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let reg = BackendRegistry::new(Some(desc("")), vec![]);
        assert!(reg.resolve(None).is_ok());
        assert!(matches!(
            reg.resolve(Some("x")),
            Err(ProxyError::RouteNotFound(_))
        ));
    }

    #[test]
    fn resolve_without_default_is_not_found() {
        let reg = BackendRegistry::new(None, vec![desc("a")]);
        assert!(matches!(reg.resolve(None), Err(ProxyError::RouteNotFound(_))));
        assert!(reg.resolve(Some("a")).is_ok());
    }

    #[test]
    fn empty_registry() {
        assert!(BackendRegistry::default().is_empty());
        assert!(!BackendRegistry::new(Some(desc("")), vec![]).is_empty());
    }
}
