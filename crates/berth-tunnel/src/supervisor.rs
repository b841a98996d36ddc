//! Tunnel supervisor
//!
//! Composition root for one running tunnel: validates the configuration,
//! binds the listener, fans accepted connections out to sessions and wires
//! the optional companion process into the shared shutdown signal. Binding
//! is split from running so callers can learn the actual bound address
//! before the accept loop starts.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::companion::{run_companion, CompanionCommand};
use crate::config::TunnelConfig;
use crate::dialer::TunnelDialer;
use crate::error::{Result, TunnelError};
use crate::listener::{accept_loop, bind};
use crate::session::run_session;
use crate::shutdown::ShutdownSignal;

/// Builder for a running tunnel
pub struct TunnelSupervisor {
    config: TunnelConfig,
    dialer: Arc<dyn TunnelDialer>,
    shutdown: ShutdownSignal,
    companion: Option<CompanionCommand>,
}

impl TunnelSupervisor {
    /// Create a supervisor for `config`, dialing tunnels with `dialer`
    pub fn new(config: TunnelConfig, dialer: Arc<dyn TunnelDialer>) -> Self {
        Self {
            config,
            dialer,
            shutdown: ShutdownSignal::new(),
            companion: None,
        }
    }

    /// Run a companion process for the tunnel's lifetime
    #[must_use]
    pub fn with_companion(mut self, command: CompanionCommand) -> Self {
        self.companion = Some(command);
        self
    }

    /// Shutdown signal shared with the tunnel
    ///
    /// Clones can be handed to signal handlers or other producers before
    /// the tunnel starts.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Validate the configuration and bind the local listener.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Config`] for an invalid configuration and
    /// [`TunnelError::Bind`] when the local address cannot be bound.
    pub async fn bind(self) -> Result<BoundTunnel> {
        self.config.validate().map_err(TunnelError::config)?;

        let addr = self.config.bind_addr();
        let listener = bind(&addr).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TunnelError::bind(addr, e))?;

        info!(addr = %local_addr, app = %self.config.app, "tunnel listening");

        Ok(BoundTunnel {
            local_addr,
            listener,
            dialer: self.dialer,
            shutdown: self.shutdown,
            companion: self.companion,
        })
    }
}

/// A tunnel whose listener is bound but not yet accepting
pub struct BoundTunnel {
    local_addr: SocketAddr,
    listener: TcpListener,
    dialer: Arc<dyn TunnelDialer>,
    shutdown: ShutdownSignal,
    companion: Option<CompanionCommand>,
}

impl BoundTunnel {
    /// Address the listener actually bound
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shutdown signal shared with the tunnel
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown.
    ///
    /// Each accepted connection runs as an independent spawned session, so
    /// a stopped listener never cancels sessions already in flight. When a
    /// companion command is configured it is launched with the bound
    /// endpoint filled in, and its exit requests shutdown.
    pub async fn run(self) {
        if let Some(command) = self.companion {
            tokio::spawn(run_companion(
                command.with_endpoint(self.local_addr),
                self.shutdown.clone(),
            ));
        }

        let dialer = self.dialer;
        accept_loop(self.listener, self.shutdown, move |stream, peer| {
            tokio::spawn(run_session(stream, peer, dialer.clone()));
        })
        .await;

        info!("tunnel stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::{TunnelSink, TunnelSource, WsError, WsMessage};
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use futures_util::{SinkExt, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// Dialer that captures everything sent into each tunnel and never
    /// sends anything back.
    struct CaptureDialer {
        captured: Mutex<Vec<mpsc::UnboundedReceiver<WsMessage>>>,
    }

    impl CaptureDialer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                captured: Mutex::new(Vec::new()),
            })
        }

        fn take_capture(&self) -> Option<mpsc::UnboundedReceiver<WsMessage>> {
            self.captured.lock().unwrap().pop()
        }
    }

    #[async_trait]
    impl TunnelDialer for CaptureDialer {
        async fn dial(&self) -> crate::error::Result<(TunnelSink, TunnelSource)> {
            let (tx, rx) = mpsc::unbounded();
            self.captured.lock().unwrap().push(rx);
            let sink: TunnelSink = Box::pin(tx.sink_map_err(|_| WsError::ConnectionClosed));
            let source: TunnelSource =
                Box::pin(futures::stream::pending::<std::result::Result<WsMessage, WsError>>());
            Ok((sink, source))
        }
    }

    /// Dialer whose first dial fails; later dials behave like
    /// [`CaptureDialer`].
    struct FlakyDialer {
        dials: AtomicUsize,
        captured: Mutex<Vec<mpsc::UnboundedReceiver<WsMessage>>>,
    }

    impl FlakyDialer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                dials: AtomicUsize::new(0),
                captured: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TunnelDialer for FlakyDialer {
        async fn dial(&self) -> crate::error::Result<(TunnelSink, TunnelSource)> {
            if self.dials.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(TunnelError::connect("gateway unavailable"));
            }
            let (tx, rx) = mpsc::unbounded();
            self.captured.lock().unwrap().push(rx);
            let sink: TunnelSink = Box::pin(tx.sink_map_err(|_| WsError::ConnectionClosed));
            let source: TunnelSource =
                Box::pin(futures::stream::pending::<std::result::Result<WsMessage, WsError>>());
            Ok((sink, source))
        }
    }

    fn test_config(port: u16) -> TunnelConfig {
        TunnelConfig::new("api.berth.dev", "my-app")
            .with_bind_host("127.0.0.1")
            .with_bind_port(port)
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = TunnelConfig::new("api.berth.dev", "");
        let err = TunnelSupervisor::new(config, CaptureDialer::new())
            .bind()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TunnelError::Config { .. }));
    }

    #[tokio::test]
    async fn test_bind_reports_actual_address() {
        let bound = TunnelSupervisor::new(test_config(0), CaptureDialer::new())
            .bind()
            .await
            .unwrap();
        assert!(bound.local_addr().port() > 0);
        assert!(bound.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let bound = TunnelSupervisor::new(test_config(0), CaptureDialer::new())
            .bind()
            .await
            .unwrap();
        let shutdown = bound.shutdown_signal();

        let running = tokio::spawn(bound.run());
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("run should stop after shutdown")
            .expect("run task should not panic");
    }

    #[tokio::test]
    async fn test_sessions_do_not_cross_talk() {
        let dialer = CaptureDialer::new();
        let bound = TunnelSupervisor::new(test_config(0), dialer.clone())
            .bind()
            .await
            .unwrap();
        let addr = bound.local_addr();
        tokio::spawn(bound.run());

        for payload in [&b"alpha"[..], &b"bravo"[..]] {
            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(payload).await.unwrap();
            client.shutdown().await.unwrap();

            let rx = tokio::time::timeout(Duration::from_secs(1), async {
                loop {
                    if let Some(rx) = dialer.take_capture() {
                        break rx;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("session should dial its own tunnel");

            let messages: Vec<WsMessage> = rx.collect().await;
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0], WsMessage::Binary(payload.to_vec()));
            assert!(matches!(messages[1], WsMessage::Close(_)));
        }
    }

    #[tokio::test]
    async fn test_dial_failure_leaves_other_sessions_untouched() {
        let dialer = FlakyDialer::new();
        let bound = TunnelSupervisor::new(test_config(0), dialer.clone())
            .bind()
            .await
            .unwrap();
        let addr = bound.local_addr();
        tokio::spawn(bound.run());

        let mut failed_client = TcpStream::connect(addr).await.unwrap();
        failed_client.write_all(b"lost").await.unwrap();

        // Hold the failed connection open while a second session dials.
        tokio::time::timeout(Duration::from_secs(1), async {
            while dialer.dials.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first session should attempt a dial");

        let mut ok_client = TcpStream::connect(addr).await.unwrap();
        ok_client.write_all(b"kept").await.unwrap();
        ok_client.shutdown().await.unwrap();

        let rx = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(rx) = dialer.captured.lock().unwrap().pop() {
                    break rx;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second session should dial despite the first failing");

        let messages: Vec<WsMessage> = rx.collect().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], WsMessage::Binary(b"kept".to_vec()));
        assert!(matches!(messages[1], WsMessage::Close(_)));

        // The failed session closed its client without touching the other.
        let mut leftover = Vec::new();
        failed_client.read_to_end(&mut leftover).await.unwrap();
        assert!(leftover.is_empty());
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_in_flight_session_survives_shutdown() {
        let dialer = CaptureDialer::new();
        let bound = TunnelSupervisor::new(test_config(0), dialer.clone())
            .bind()
            .await
            .unwrap();
        let addr = bound.local_addr();
        let shutdown = bound.shutdown_signal();
        let running = tokio::spawn(bound.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"before").await.unwrap();

        let mut rx = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(rx) = dialer.take_capture() {
                    break rx;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session should dial");
        assert_eq!(rx.next().await, Some(WsMessage::Binary(b"before".to_vec())));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("listener should stop")
            .expect("run task should not panic");

        // The established session keeps relaying after the listener is gone.
        client.write_all(b"after").await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), rx.next())
            .await
            .expect("in-flight session should keep relaying");
        assert_eq!(next, Some(WsMessage::Binary(b"after".to_vec())));

        // New connections are refused once the listener is released.
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_companion_exit_stops_tunnel() {
        let bound = TunnelSupervisor::new(test_config(0), CaptureDialer::new())
            .with_companion(crate::companion::CompanionCommand::new("true"))
            .bind()
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), bound.run())
            .await
            .expect("companion exit should stop the tunnel");
    }
}
