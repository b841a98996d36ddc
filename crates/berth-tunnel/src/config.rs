//! Tunnel configuration

use serde::{Deserialize, Serialize};

/// Default local bind host
pub const DEFAULT_BIND_HOST: &str = "localhost";

/// Default local bind port, offset from the usual Postgres port so a local
/// server can keep running alongside the tunnel
pub const DEFAULT_BIND_PORT: u16 = 15432;

/// Configuration for a database tunnel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Local host to bind the listener on
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Local port to bind the listener on
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Platform API host, without scheme
    pub api_host: String,

    /// Application slug identifying the target database
    pub app: String,
}

fn default_bind_host() -> String {
    DEFAULT_BIND_HOST.to_string()
}

fn default_bind_port() -> u16 {
    DEFAULT_BIND_PORT
}

impl TunnelConfig {
    /// Create a configuration with default local bind settings
    pub fn new(api_host: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            bind_host: default_bind_host(),
            bind_port: DEFAULT_BIND_PORT,
            api_host: api_host.into(),
            app: app.into(),
        }
    }

    /// Set the local bind host
    #[must_use]
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Set the local bind port
    #[must_use]
    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    /// Local address the listener binds, as `host:port`
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    /// WebSocket URL of the database tunnel endpoint for this app
    #[must_use]
    pub fn tunnel_url(&self) -> String {
        format!("wss://{}/v1/apps/{}/db/tunnel", self.api_host, self.app)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_host.is_empty() {
            return Err("bind host cannot be empty".to_string());
        }
        if self.api_host.is_empty() {
            return Err("API host cannot be empty".to_string());
        }
        if self.api_host.contains("://") {
            return Err("API host must not include a scheme".to_string());
        }
        if self.api_host.contains('/') {
            return Err("API host must not include a path".to_string());
        }
        if self.app.is_empty() {
            return Err("app slug cannot be empty".to_string());
        }
        if !self
            .app
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(
                "app slug can only contain alphanumeric characters, hyphens, and underscores"
                    .to_string(),
            );
        }
        Ok(())
    }
}
