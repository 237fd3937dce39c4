use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use realtime_hub::config::Settings;
use realtime_hub::hub::Hub;
use realtime_hub::server::{create_app, AppState};
use realtime_hub::shutdown::GracefulShutdown;
use realtime_hub::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing (kept alive until exit)
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Create the hub and start its coordinator
    let (hub, coordinator) = Hub::new(settings.hub.clone());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let coordinator_handle = tokio::spawn(coordinator.run(shutdown_tx.subscribe()));

    // Create application state
    let state = AppState::new(settings.clone(), hub.clone());
    tracing::info!("Application state initialized");

    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // On signal, drain live connections before the listener stops
    let shutdown = GracefulShutdown::new(hub, shutdown_tx);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.execute("Server is shutting down").await;
        })
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = coordinator_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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
