//! HTTP server for the UI
//!
//! The UI drives sign-in and conversations through a small JSON API.
//! Handlers stay thin: every decision is made by [`ChatService`].

mod router;

pub use router::{AppState, create_router};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::service::ChatService;
use crate::{Error, Result};

/// Interval between sweeps of expired state tokens
const STATE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// HTTP server
pub struct Server {
    config: Config,
    service: Arc<ChatService>,
}

impl Server {
    /// Create a server around a built service
    #[must_use]
    pub fn new(config: Config, service: Arc<ChatService>) -> Self {
        Self { config, service }
    }

    /// Run until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        let state = Arc::new(AppState {
            service: Arc::clone(&self.service),
        });
        let app = create_router(state, self.config.server.request_timeout);

        let listener = TcpListener::bind(addr).await?;
        info!("============================================================");
        info!("Asha session core v{}", env!("CARGO_PKG_VERSION"));
        info!("Listening on http://{addr}");
        info!("OAuth redirect: {}", self.config.oauth.redirect_uri);
        info!("Generative model: {}", self.config.dispatch.model);
        info!("============================================================");

        // Sweep expired state tokens so abandoned sign-ins do not pile up
        let service = Arc::clone(&self.service);
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATE_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        service.purge_expired_states();
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        let mut graceful_rx = shutdown_tx.subscribe();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = graceful_rx.recv().await;
                })
                .await
        });

        shutdown_signal(shutdown_tx).await;

        // Give in-flight requests a bounded time to finish
        let shutdown_timeout = self.config.server.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, server).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(Error::Internal(format!("Server task failed: {e}"))),
            Err(_) => warn!(
                timeout = ?shutdown_timeout,
                "Graceful shutdown timed out, dropping open connections"
            ),
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
