//! Graceful shutdown handling.
//!
//! One [`GracefulShutdown`] handle is shared by every server instance. It is
//! a latch: once triggered it stays triggered, so an instance that starts
//! listening after SIGTERM still stops immediately.

use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Process-wide shutdown latch.
#[derive(Clone)]
pub struct GracefulShutdown {
    triggered: watch::Sender<bool>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self {
            triggered: watch::channel(false).0,
        }
    }

    /// Trigger shutdown. Later calls have no effect.
    pub fn shutdown(&self) {
        let first = self
            .triggered
            .send_if_modified(|triggered| !std::mem::replace(triggered, true));
        if first {
            info!("Initiating graceful shutdown");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.borrow()
    }

    /// Signal future for the component called `name`.
    pub fn signal(&self, name: impl Into<String>) -> ShutdownSignal {
        ShutdownSignal {
            name: name.into(),
            triggered: self.triggered.subscribe(),
        }
    }

    /// Trigger shutdown on SIGINT or SIGTERM, from a background task.
    pub fn listen_for_signals(&self) {
        let handle = self.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = terminate => info!("Received SIGTERM"),
            }

            handle.shutdown();
        });
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown has been triggered.
pub struct ShutdownSignal {
    name: String,
    triggered: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        // Err: all handles dropped, nothing can trigger anymore.
        let closed = self.triggered.wait_for(|triggered| *triggered).await.is_err();
        if closed {
            debug!("Shutdown handle dropped before '{}' was stopped", self.name);
            std::future::pending::<()>().await;
        }
        info!("'{}' received shutdown signal", self.name);
    }
}
