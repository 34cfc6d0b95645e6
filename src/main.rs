//! Transaction Categorizer - Main Entry Point
//!
//! Serves category inference over HTTP: a batch of transactions in, a
//! result envelope of predicted categories and confidences out.

use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use transaction_categorizer::{
    config::AppConfig,
    http::{self, AppState},
    metrics::{MetricsReporter, ServiceMetrics},
    models::artifacts::ArtifactStore,
    predictor::{InitOutcome, TransactionPredictor},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config);

    info!("Starting Transaction Categorizer");
    info!(
        backend = ?config.storage.backend,
        use_mock = config.predictor.use_mock,
        "Configuration loaded successfully"
    );

    // The predictor is constructed and initialized exactly once, before
    // serving; handlers share it read-only.
    let store = ArtifactStore::from_config(&config.storage);
    let mut predictor =
        TransactionPredictor::new(config.predictor.clone(), config.api.clone()).with_store(store);
    match predictor.initialize().await? {
        InitOutcome::Remote => info!("Predictor ready in remote mode"),
        InitOutcome::Mock => info!("Predictor ready in mock mode"),
        InitOutcome::FellBack { reason } => {
            warn!(reason = %reason, "Remote setup failed; serving mock predictions")
        }
    }

    let metrics = Arc::new(ServiceMetrics::new());

    // Periodic metrics summary (every 30 seconds)
    let reporter = MetricsReporter::new(metrics.clone(), 30);
    tokio::spawn(async move {
        reporter.start().await;
    });

    let state = AppState {
        predictor: Arc::new(predictor),
        metrics,
    };

    let port = config.server.port;
    let server = tokio::spawn(async move {
        if let Err(e) = http::start_server(port, state).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down transaction categorizer");
        }
        _ = server => {
            tracing::error!("HTTP server stopped");
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
