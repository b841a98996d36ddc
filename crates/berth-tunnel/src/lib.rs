//! `Berth` Tunnel - Local access to `Berth` managed databases
//!
//! Binds a TCP listener on the developer's machine and relays every
//! connection through an authenticated WebSocket tunnel to the platform,
//! so ordinary database clients can talk to a managed database as if it
//! were local:
//!
//! - **Listener** - Loopback TCP endpoint on a stable local port
//! - **Sessions** - One dedicated tunnel per client connection, bytes
//!   relayed in both directions until either side finishes
//! - **Shutdown** - A shared one-shot signal fed by Ctrl-C, SIGTERM or
//!   the companion process; in-flight sessions are left to drain
//! - **Companion** - Optional interactive client whose exit ends the
//!   tunnel
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use berth_tunnel::{StaticToken, TunnelConfig, TunnelSupervisor, WsDialer};
//!
//! # async fn example() -> berth_tunnel::Result<()> {
//! let config = TunnelConfig::new("api.berth.dev", "my-app");
//! let dialer = WsDialer::new(
//!     config.tunnel_url(),
//!     Arc::new(StaticToken("brt_abc123".to_string())),
//! );
//!
//! let bound = TunnelSupervisor::new(config, Arc::new(dialer)).bind().await?;
//! println!("listening on {}", bound.local_addr());
//! bound.run().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod companion;
pub mod config;
pub mod dialer;
pub mod error;
pub mod listener;
pub mod session;
pub mod shutdown;
pub mod supervisor;

// Re-export main types at crate root
pub use companion::{CompanionCommand, ENV_TUNNEL_HOST, ENV_TUNNEL_PORT};
pub use config::{TunnelConfig, DEFAULT_BIND_HOST, DEFAULT_BIND_PORT};
pub use dialer::{
    Authenticator, SlugResolver, StaticSlug, StaticToken, TunnelDialer, TunnelSink, TunnelSource,
    WsDialer,
};
pub use error::{Result, TunnelError};
pub use session::CHUNK_SIZE;
pub use shutdown::{listen_for_signals, ShutdownSignal};
pub use supervisor::{BoundTunnel, TunnelSupervisor};
