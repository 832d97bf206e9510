use std::sync::Arc;

use anyhow::Context;
use bybit_client::BybitClient;
use tracing::info;

use grid_sync::{observability, AppState, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;

    observability::init_tracing(&settings.log_level);
    info!(app = %settings.app_name, environment = ?settings.environment, "Starting grid sync service");

    info!("Connecting to database...");
    let db = grid_sync::db::init_db(&settings).await?;
    info!("Database connected");

    info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&db).await?;
    info!("Migrations applied");

    let client = BybitClient::new(settings.bybit_client_config()).context("building Bybit client")?;
    let state = Arc::new(AppState::new(db.clone(), Arc::new(client)));

    let app = grid_sync::app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?;
    info!("Grid sync listening on port {}", settings.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Closing database pool");
    db.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
