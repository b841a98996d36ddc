//! Shutdown coordination
//!
//! A [`ShutdownSignal`] is a one-shot flag shared between every part of a
//! running tunnel: the OS signal handler, the companion process watcher and
//! any caller holding a clone may request shutdown. The first trigger wins,
//! later triggers are no-ops, and the accept loop observes the flag exactly
//! once. In-flight sessions are deliberately left alone so an interactive
//! client can finish its last query.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Cloneable one-shot stop flag with multiple producers and consumers.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown.
    ///
    /// Returns `true` for the caller that actually flipped the flag and
    /// `false` for every later caller.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopping| {
            if *stopping {
                false
            } else {
                *stopping = true;
                true
            }
        })
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    ///
    /// Completes immediately if the signal was already triggered.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // Err means every sender is gone, which only happens when the owning
        // signal was dropped entirely. Treat that as a stop.
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse `SIGINT` and `SIGTERM` into a shutdown request.
///
/// Runs until a signal arrives, then triggers `shutdown` and returns.
pub async fn listen_for_signals(shutdown: ShutdownSignal) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler could be installed, nothing to wait on.
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received interrupt, shutting down");
        }
        _ = terminate => {
            info!("received terminate, shutting down");
        }
    }

    shutdown.trigger();
}
