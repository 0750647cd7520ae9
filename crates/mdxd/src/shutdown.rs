//! Termination signals

use tracing::{error, info, warn};

/// Wait for Ctrl-C or SIGTERM
pub async fn wait_for_termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down..."),
        _ = terminate => info!("SIGTERM received, shutting down..."),
    }
}

/// Log further signals while shutdown runs. Meant to be spawned and aborted.
pub async fn log_repeated_signals() {
    loop {
        wait_for_termination().await;
        warn!("Shutdown already in progress");
    }
}
