use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::{MetricsError, Result};

/// Serves `app` on `listener` until SIGINT or SIGTERM arrives.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting the server on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MetricsError::Internal(format!("Server error: {}", e)))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
