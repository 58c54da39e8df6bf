//! # HTTP Server
//!
//! Sync webhook, metrics and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/sync` - Runs one sync for the posted resource and returns its status
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 when controller is ready)

use crate::controller::sync::SyncCoordinator;
use crate::crd::{SyncRequest, TerraformStatus};
use crate::observability::metrics;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
    pub coordinator: SyncCoordinator,
}

impl ServerState {
    #[must_use]
    pub fn new(coordinator: SyncCoordinator) -> Self {
        Self {
            is_ready: Arc::new(AtomicBool::new(false)),
            coordinator,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }
}

/// Body returned by `/sync`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncResponse {
    pub body: TerraformStatus,
}

/// Router with every endpoint, without binding a socket
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/sync", post(sync_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `port`, mark the server ready and serve until the listener fails
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let app = build_router(state.clone());

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn sync_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let request: SyncRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting malformed sync request: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let status = state.coordinator.sync(&request).await;
    (StatusCode::OK, Json(SyncResponse { body: status })).into_response()
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            text,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
