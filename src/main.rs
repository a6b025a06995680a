use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tracing::{info, warn};

use aviation_training_backend::{
    app::create_router,
    app_state::AppState,
    config,
    db::{self, PgEntityStore},
    engine::{SystemClock, TrainingEngine},
    telemetry::{init_telemetry, TelemetryConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = config::init()?;
    let telemetry = init_telemetry(TelemetryConfig::from_config(config)).await?;
    if config.is_production() && !telemetry.config().exporter_configured() {
        warn!("Running in production without an OTLP exporter");
    }

    let pool = db::init_pool(config)
        .await
        .context("Failed to initialize database")?;

    let store = PgEntityStore::new(pool.clone());
    let engine = TrainingEngine::new(
        Arc::new(store),
        Arc::new(SystemClock),
        config.engine_settings(),
    );

    let state = AppState::new(pool, config, Arc::new(engine));
    let app = create_router(state);

    let addr = config.server_addr();
    info!("{} Listening on {}", config.app.name, addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to serve application")?;

    telemetry.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler there is nothing to wait on; keep serving.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
