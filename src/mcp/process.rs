//! Backend process management.
//!
//! Spawns and supervises one stdio MCP child per session. The child's
//! stderr is inherited so backend logs reach the operator directly.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::constants::limits;
use crate::core::errors::ProxyError;
use crate::registry::BackendDescriptor;

pub struct ProcessSupervisor {
    child: Child,
    command: String,
}

impl ProcessSupervisor {
    /// Spawn the backend described by `desc`.
    ///
    /// The child environment is exactly the descriptor's environment map:
    /// empty unless the operator passed the parent environment through, plus
    /// any per-server overlay. Returns the supervisor and the piped stdio
    /// streams.
    pub fn spawn(
        desc: &BackendDescriptor,
    ) -> Result<
        (
            Self,
            impl AsyncWrite + Unpin + Send + 'static,
            impl AsyncRead + Unpin + Send + 'static,
        ),
        ProxyError,
    > {
        info!(command = %desc.command, args = ?desc.args, "spawning backend");

        let mut command = Command::new(&desc.command);
        command
            .args(&desc.args)
            .env_clear()
            .envs(&desc.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // Command resolution uses the proxy's own PATH when the descriptor
        // does not carry one.
        if !desc.env.contains_key("PATH") {
            if let Ok(path) = std::env::var("PATH") {
                command.env("PATH", path);
            }
        }
        if let Some(cwd) = &desc.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| ProxyError::SpawnFailed {
            command: desc.command.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ProxyError::SpawnFailed {
            command: desc.command.clone(),
            reason: "stdin was not piped".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ProxyError::SpawnFailed {
            command: desc.command.clone(),
            reason: "stdout was not piped".to_string(),
        })?;

        Ok((
            Self {
                child,
                command: desc.command.clone(),
            },
            stdin,
            stdout,
        ))
    }

    /// Reap the child: its stdin is already closed by the caller, so a
    /// well-behaved backend exits on its own. Escalate to kill after the
    /// grace period.
    pub async fn shutdown(&mut self) {
        match tokio::time::timeout(limits::KILL_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(command = %self.command, code = ?status.code(), "backend exited");
            }
            Ok(Err(e)) => {
                warn!(command = %self.command, error = %e, "failed to wait on backend");
            }
            Err(_) => {
                warn!(command = %self.command, "backend did not exit in time, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(command = %self.command, error = %e, "failed to kill backend");
                }
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // Last-resort cleanup if the supervising task was aborted.
        let _ = self.child.start_kill();
    }
}
