//! Local listener management

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::{Result, TunnelError};
use crate::shutdown::ShutdownSignal;

/// Bind the local listener.
///
/// # Errors
///
/// Returns [`TunnelError::Bind`] when the address cannot be bound, for
/// example because the port is occupied or the address does not parse.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TunnelError::bind(addr, e))?;
    Ok(listener)
}

/// Accept connections until shutdown is requested.
///
/// Every accepted connection is handed to `handler` together with its peer
/// address; the handler is expected to spawn the session and return
/// immediately. The loop ends when `shutdown` fires or when accepting
/// itself fails, and the listener socket is released exactly once on the
/// way out. Sessions already handed off keep running.
pub async fn accept_loop<H>(listener: TcpListener, shutdown: ShutdownSignal, handler: H)
where
    H: Fn(TcpStream, SocketAddr),
{
    if let Ok(local_addr) = listener.local_addr() {
        if !local_addr.ip().is_loopback() {
            warn!(
                addr = %local_addr,
                "listening on a non-loopback address, the tunnel is reachable from other hosts"
            );
        }
    }

    loop {
        tokio::select! {
            () = shutdown.triggered() => {
                info!("stopping listener");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => handler(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept failed, stopping listener");
                        break;
                    }
                }
            }
        }
    }
}
