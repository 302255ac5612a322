//! Marketplace Back-office service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use marketplace_backoffice::{
    app::AppState,
    config::Config,
    http,
    notify::{LogNotifier, NatsNotifier, Notifier},
    store::Stores,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();
    let config = Config::from_env()?;

    let stores = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Stores::postgres(db)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            Stores::in_memory()
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client, config.nats_subject_prefix.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let app = http::router(AppState::new(&config, stores, notifier));
    tracing::info!(port = config.port, recompute = ?config.recompute, "marketplace back-office listening");
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
