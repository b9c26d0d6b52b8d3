use anyhow::Context;
use seatline_api::{app, worker, AppState};
use seatline_booking::BookingService;
use seatline_store::app_config::Config;
use seatline_store::{DbClient, PgBackend};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "seatline_api=debug,seatline_booking=debug,seatline_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Seatline on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let backend = PgBackend::new(&db);

    if config.kafka.enabled {
        worker::start_replication_worker(&config.kafka, backend.clone())
            .context("Failed to start replication worker")?;
    } else {
        tracing::warn!("Kafka disabled, event definitions will not be replicated");
    }

    let app = app(AppState::new(BookingService::new(backend)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
