use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::scheduler::LeaseScheduler;

#[derive(Clone)]
pub struct DashboardState {
    pub scheduler: Arc<LeaseScheduler>,
}

#[derive(Serialize)]
struct CatalogResponse {
    token_count: usize,
    tokens: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Read-only HTTP view of the catalog and job registry.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/catalog", get(catalog_handler))
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/jobs/:job_id", get(job_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn catalog_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let tokens = state.scheduler.show().await;
    Json(CatalogResponse {
        token_count: tokens.len(),
        tokens,
    })
}

async fn list_jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.scheduler.job_summaries().await)
}

async fn job_handler(
    State(state): State<DashboardState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.job_summary(&job_id).await {
        Some(summary) => (StatusCode::OK, Json(summary)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Job not found: {}", job_id),
            }),
        )
            .into_response(),
    }
}
