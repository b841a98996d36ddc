//! Session bridge
//!
//! Each accepted local connection gets its own session: a freshly dialed
//! tunnel and two relay directions that run concurrently until both sides
//! are done. The relay functions are generic over the transport halves so
//! they can be driven by in-memory doubles in tests.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dialer::{TunnelDialer, WsError, WsMessage};
use crate::error::{Result, TunnelError};

/// Upper bound on the payload of a single outbound tunnel message
pub const CHUNK_SIZE: usize = 32 * 1024;

fn normal_close() -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
}

/// Relay bytes from the local client into the tunnel.
///
/// Reads are forwarded as binary messages of at most [`CHUNK_SIZE`] bytes.
/// A clean EOF from the client sends a normal close over the tunnel and
/// returns the byte count; a failed read or send is an error.
///
/// # Errors
///
/// Returns [`TunnelError::Transport`] when the local read or the tunnel
/// send fails.
pub async fn relay_local_to_remote<R, S>(mut local: R, mut remote: S) -> Result<u64>
where
    R: AsyncRead + Unpin,
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        match local.read(&mut buf).await {
            Ok(0) => {
                remote
                    .send(normal_close())
                    .await
                    .map_err(|e| TunnelError::transport(format!("close send failed: {e}")))?;
                return Ok(total);
            }
            Ok(n) => {
                remote
                    .send(WsMessage::Binary(buf[..n].to_vec()))
                    .await
                    .map_err(|e| TunnelError::transport(format!("tunnel send failed: {e}")))?;
                total += n as u64;
            }
            Err(e) => {
                return Err(TunnelError::transport(format!("local read failed: {e}")));
            }
        }
    }
}

/// Relay bytes from the tunnel back to the local client.
///
/// Binary payloads are written verbatim and in arrival order. A close
/// message or end of stream finishes the direction; either way the local
/// write side is shut down so the client never sees a half-open socket.
///
/// # Errors
///
/// Returns [`TunnelError::Transport`] when the tunnel read or the local
/// write fails.
pub async fn relay_remote_to_local<W, S>(mut remote: S, mut local: W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    let mut total: u64 = 0;

    let result = loop {
        match remote.next().await {
            Some(Ok(WsMessage::Binary(data))) => {
                if let Err(e) = local.write_all(&data).await {
                    break Err(TunnelError::transport(format!("local write failed: {e}")));
                }
                total += data.len() as u64;
            }
            Some(Ok(WsMessage::Close(_))) | None => break Ok(total),
            Some(Ok(other)) => {
                debug!(kind = ?message_kind(&other), "ignoring non-binary tunnel message");
            }
            Some(Err(e)) => {
                break Err(TunnelError::transport(format!("tunnel read failed: {e}")));
            }
        }
    };

    let _ = local.shutdown().await;
    result
}

fn message_kind(message: &WsMessage) -> &'static str {
    match message {
        WsMessage::Text(_) => "text",
        WsMessage::Binary(_) => "binary",
        WsMessage::Ping(_) => "ping",
        WsMessage::Pong(_) => "pong",
        WsMessage::Close(_) => "close",
        WsMessage::Frame(_) => "frame",
    }
}

/// Run one session to completion.
///
/// Dials a dedicated tunnel for `local`, runs both relay directions until
/// they finish, then releases both sockets. A failed dial closes the local
/// connection and leaves every other session untouched.
pub async fn run_session(local: TcpStream, peer: SocketAddr, dialer: Arc<dyn TunnelDialer>) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, peer = %peer, "client connected");

    let (sink, source) = match dialer.dial().await {
        Ok(halves) => halves,
        Err(e) => {
            warn!(session_id = %session_id, peer = %peer, error = %e, "tunnel dial failed");
            return;
        }
    };

    let (read_half, write_half) = local.into_split();

    let (to_remote, to_local) = tokio::join!(
        relay_local_to_remote(read_half, sink),
        relay_remote_to_local(source, write_half),
    );

    match to_remote {
        Ok(bytes) => debug!(session_id = %session_id, bytes_sent = bytes, "outbound relay finished"),
        Err(e) => warn!(session_id = %session_id, error = %e, "outbound relay failed"),
    }
    match to_local {
        Ok(bytes) => debug!(session_id = %session_id, bytes_received = bytes, "inbound relay finished"),
        Err(e) => warn!(session_id = %session_id, error = %e, "inbound relay failed"),
    }

    info!(session_id = %session_id, peer = %peer, "client disconnected");
}
