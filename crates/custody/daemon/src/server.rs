//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use custody_oracle::AuthorizationOracle;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Oracle daemon server
pub struct Server {
    config: DaemonConfig,
    oracle: Arc<AuthorizationOracle>,
}

impl Server {
    /// Build the oracle from the configured snapshot. Any failure is fatal.
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let oracle = AuthorizationOracle::initialize(config.oracle.clone())?;
        Ok(Self {
            config,
            oracle: Arc::new(oracle),
        })
    }

    pub fn oracle(&self) -> Arc<AuthorizationOracle> {
        self.oracle.clone()
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(AppState::new(self.oracle.clone()), &self.config.server);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, "Custody oracle listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Custody oracle shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
