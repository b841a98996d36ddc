//! Tunnel dialing and credential ports
//!
//! The session bridge only ever sees the [`TunnelDialer`] trait, so tests
//! and alternative transports can stand in for the real WebSocket client.
//! Dialed tunnels are handed back as boxed sink and stream halves.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::error::{Result, TunnelError};

/// Error type produced by the WebSocket transport
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Message type carried over the tunnel
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Write half of a dialed tunnel
pub type TunnelSink = Pin<Box<dyn Sink<WsMessage, Error = WsError> + Send>>;

/// Read half of a dialed tunnel
pub type TunnelSource = Pin<Box<dyn Stream<Item = std::result::Result<WsMessage, WsError>> + Send>>;

/// Source of the bearer token presented when dialing
pub trait Authenticator: Send + Sync {
    /// Produce the current bearer token
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Connect`] when no credential is available.
    fn bearer_token(&self) -> Result<String>;
}

/// Maps the user's intent to an application slug
pub trait SlugResolver: Send + Sync {
    /// Resolve the target application slug
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Config`] when no application can be determined.
    fn resolve(&self) -> Result<String>;
}

/// Opens one tunnel per local client connection
#[async_trait]
pub trait TunnelDialer: Send + Sync {
    /// Dial a fresh tunnel and return its halves
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Connect`] when the tunnel cannot be
    /// established.
    async fn dial(&self) -> Result<(TunnelSink, TunnelSource)>;
}

/// Authenticator backed by a token already in hand
pub struct StaticToken(pub String);

impl Authenticator for StaticToken {
    fn bearer_token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(TunnelError::connect("bearer token is empty"));
        }
        Ok(self.0.clone())
    }
}

/// Slug resolver backed by an explicit slug
pub struct StaticSlug(pub String);

impl SlugResolver for StaticSlug {
    fn resolve(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(TunnelError::config("app slug is empty"));
        }
        Ok(self.0.clone())
    }
}

/// WebSocket dialer for the platform's database tunnel endpoint
pub struct WsDialer {
    url: String,
    auth: Arc<dyn Authenticator>,
}

impl WsDialer {
    /// Create a dialer for `url`, authenticating with `auth`
    pub fn new(url: impl Into<String>, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            url: url.into(),
            auth,
        }
    }
}

#[async_trait]
impl TunnelDialer for WsDialer {
    async fn dial(&self) -> Result<(TunnelSink, TunnelSource)> {
        let token = self.auth.bearer_token()?;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TunnelError::connect(format!("invalid tunnel URL: {e}")))?;

        let header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TunnelError::connect(format!("invalid bearer token: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| TunnelError::connect(e.to_string()))?;

        let (sink, stream) = ws.split();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
