//! HTTP surface: Execute and Repair over JSON.
//!
//! - `POST /run`, `POST /execute`: run once and classify
//! - `POST /repair`: full repair session
//! - `GET  /health`

use crate::runtime::Runtime;
use autofix_core::{ExecuteRequest, RepairRequest};
use autofix_engine::EngineError;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

// ============================================================================
// Server
// ============================================================================

pub fn router(runtime: Arc<Runtime>, body_limit: usize) -> Router {
    Router::new()
        .route("/run", post(execute_handler))
        .route("/execute", post(execute_handler))
        .route("/repair", post(repair_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(runtime)
}

pub async fn serve(runtime: Arc<Runtime>, addr: &str, body_limit: usize) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "autofix server listening");
    axum::serve(listener, router(runtime, body_limit)).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn execute_handler(
    State(runtime): State<Arc<Runtime>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let response = runtime.execute(&request.code).await?;
    Ok(Json(response).into_response())
}

async fn repair_handler(
    State(runtime): State<Arc<Runtime>>,
    payload: Result<Json<RepairRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let response = runtime.repair(&request).await?;
    Ok(Json(response).into_response())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
enum AppError {
    BadJson(String),
    Engine(EngineError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadJson(rejection.body_text())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadJson(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            AppError::Engine(err) => {
                let status = match &err {
                    EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    EngineError::Sandbox(_) => StatusCode::SERVICE_UNAVAILABLE,
                    EngineError::ModelTransport(_) => StatusCode::BAD_GATEWAY,
                };
                if status.is_server_error() {
                    warn!(code = err.code(), error = %err, "request failed");
                }
                (status, err.code(), err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message, "code": code }))).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
