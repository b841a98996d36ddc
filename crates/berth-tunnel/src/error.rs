//! Error types for tunnel operations

use thiserror::Error;

/// Errors that can occur during tunnel operations
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Failed to bind the local listener
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the listener attempted to bind
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish the tunnel to the platform
    #[error("tunnel connect failed: {message}")]
    Connect {
        /// Error message
        message: String,
    },

    /// Data transfer over an established tunnel failed
    #[error("tunnel transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Companion process failure
    #[error("companion process error: {message}")]
    Companion {
        /// Error message
        message: String,
    },
}

impl TunnelError {
    /// Create a bind error
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    /// Create a connect error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a companion process error
    pub fn companion(message: impl Into<String>) -> Self {
        Self::Companion {
            message: message.into(),
        }
    }
}

/// Result type for tunnel operations
pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = TunnelError::bind(
            "127.0.0.1:15432",
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        );
        let display = err.to_string();
        assert!(display.contains("127.0.0.1:15432"));
        assert!(display.contains("address in use"));
    }

    #[test]
    fn test_connect_error_display() {
        let err = TunnelError::connect("handshake rejected");
        assert_eq!(
            err.to_string(),
            "tunnel connect failed: handshake rejected"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err = TunnelError::transport("connection reset");
        assert_eq!(err.to_string(), "tunnel transport error: connection reset");
    }

    #[test]
    fn test_config_error_display() {
        let err = TunnelError::config("app slug is required");
        assert_eq!(err.to_string(), "configuration error: app slug is required");
    }

    #[test]
    fn test_companion_error_display() {
        let err = TunnelError::companion("spawn failed");
        assert_eq!(err.to_string(), "companion process error: spawn failed");
    }

    #[test]
    fn test_bind_error_source() {
        let err = TunnelError::bind(
            "localhost:15432",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
    }
}
