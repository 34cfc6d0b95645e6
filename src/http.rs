//! HTTP trigger for category inference.
//!
//! Request validation stops malformed batches before the predictor runs:
//! missing body, missing `transactions` key and empty batches are 400s,
//! never failure envelopes.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::metrics::ServiceMetrics;
use crate::predictor::TransactionPredictor;
use crate::types::prediction;
use crate::types::transaction::Transaction;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<TransactionPredictor>,
    pub metrics: Arc<ServiceMetrics>,
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "transaction-categorizer"
    }))
}

async fn infer_category(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> (StatusCode, Json<Value>) {
    let request_id = prediction::request_id();
    info!(request_id = %request_id, "Processing inference request");

    let Some(Json(body)) = body else {
        warn!(request_id = %request_id, "No JSON data in request");
        return reject("No JSON data provided", &request_id);
    };
    let Some(raw_transactions) = body.get("transactions") else {
        warn!(request_id = %request_id, "No transactions in request data");
        return reject("No transactions provided", &request_id);
    };
    let transactions: Vec<Transaction> = match serde_json::from_value(raw_transactions.clone()) {
        Ok(transactions) => transactions,
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Malformed transactions payload");
            return reject(&format!("Invalid transactions payload: {e}"), &request_id);
        }
    };
    if transactions.is_empty() {
        warn!(request_id = %request_id, "Empty transactions list");
        return reject("Empty transactions list", &request_id);
    }

    info!(
        request_id = %request_id,
        count = transactions.len(),
        "Processing transactions"
    );

    let start = Instant::now();
    let envelope = state.predictor.predict(&transactions).await;
    state.metrics.record_request(start.elapsed(), &envelope);

    info!(
        request_id = %request_id,
        success = envelope.success,
        processed = envelope.total_processed,
        "Request complete"
    );
    (StatusCode::OK, Json(json!(envelope)))
}

fn reject(message: &str, request_id: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": message,
            "success": false,
            "request_id": request_id
        })),
    )
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/infer", post(infer_category))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!(port = port, "HTTP server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
