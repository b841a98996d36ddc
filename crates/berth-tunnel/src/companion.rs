//! Companion process launcher
//!
//! Optionally runs an interactive client (psql, a REPL, a script) wired to
//! the local endpoint. The tunnel's lifetime follows the companion: when
//! the process exits for any reason, shutdown is requested. Failing to
//! launch counts as an exit.

use std::net::SocketAddr;
use std::process::Stdio;

use tracing::{info, warn};

use crate::error::{Result, TunnelError};
use crate::shutdown::ShutdownSignal;

/// Environment variable carrying the local endpoint host
pub const ENV_TUNNEL_HOST: &str = "BERTH_TUNNEL_HOST";

/// Environment variable carrying the local endpoint port
pub const ENV_TUNNEL_PORT: &str = "BERTH_TUNNEL_PORT";

/// Command template for the companion process.
///
/// Arguments may contain the placeholders `{host}`, `{port}` and `{addr}`,
/// which are filled in with the actual bound endpoint once the listener is
/// up. The endpoint is also exported through environment variables for
/// clients that read their target from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionCommand {
    /// Program to execute
    pub program: String,
    /// Arguments, possibly containing endpoint placeholders
    pub args: Vec<String>,
    /// Extra environment variables
    pub envs: Vec<(String, String)>,
}

impl CompanionCommand {
    /// Create a command for `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Resolve endpoint placeholders against the bound address.
    #[must_use]
    pub fn with_endpoint(&self, addr: SocketAddr) -> Self {
        let host = addr.ip().to_string();
        let port = addr.port().to_string();

        let args = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{addr}", &addr.to_string())
                    .replace("{host}", &host)
                    .replace("{port}", &port)
            })
            .collect();

        let mut envs = self.envs.clone();
        envs.push((ENV_TUNNEL_HOST.to_string(), host));
        envs.push((ENV_TUNNEL_PORT.to_string(), port));

        Self {
            program: self.program.clone(),
            args,
            envs,
        }
    }
}

async fn wait_for_exit(command: &CompanionCommand) -> Result<std::process::ExitStatus> {
    let mut child_command = tokio::process::Command::new(&command.program);
    child_command
        .args(&command.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    for (key, value) in &command.envs {
        child_command.env(key, value);
    }

    let mut child = child_command
        .spawn()
        .map_err(|e| TunnelError::companion(format!("failed to launch {}: {e}", command.program)))?;
    child
        .wait()
        .await
        .map_err(|e| TunnelError::companion(format!("failed waiting for {}: {e}", command.program)))
}

/// Run the companion process to completion, then request shutdown.
///
/// The child inherits stdio so interactive clients work as expected. A
/// spawn or wait failure surfaces as [`TunnelError::Companion`] in the log,
/// is not propagated, and still triggers shutdown so the tunnel never
/// outlives a companion that went away.
pub async fn run_companion(command: CompanionCommand, shutdown: ShutdownSignal) {
    info!(program = %command.program, "launching companion process");

    match wait_for_exit(&command).await {
        Ok(status) => {
            info!(program = %command.program, status = %status, "companion process exited");
        }
        Err(e) => {
            warn!(error = %e, "companion process failed");
        }
    }

    shutdown.trigger();
}
