//! Ping endpoints
//!
//! The gateway side resolves a service name and pings one of its instances;
//! the service side is the liveness path every participating service exposes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use meshgate_cluster::ProbeResult;
use serde_json::{json, Value};

use crate::http::{error::AppResult, AppError, GatewayState, ServiceIdentity};

pub fn create_gateway_ping_router() -> Router<GatewayState> {
    Router::new()
        .route("/api/ping", get(missing_service_name))
        .route("/api/ping/", get(missing_service_name))
        .route("/api/ping/{service_name}", get(ping_service))
}

pub fn create_liveness_router() -> Router<ServiceIdentity> {
    Router::new()
        .route("/ping", get(pong))
        .route("/ping/", get(pong))
}

/// Discover `service_name` and ping one of its healthy instances
pub async fn ping_service(
    State(state): State<GatewayState>,
    Path(service_name): Path<String>,
) -> AppResult<Json<ProbeResult>> {
    if service_name.trim().is_empty() {
        return Err(missing_name_error());
    }

    let result = state.dispatcher.ping_one(&service_name).await.map_err(|e| {
        tracing::error!(service = %service_name, error = %e, "Ping failed");
        AppError::upstream("failed to ping service", &e).with("service", service_name.clone())
    })?;

    Ok(Json(result))
}

async fn missing_service_name() -> AppError {
    missing_name_error()
}

fn missing_name_error() -> AppError {
    AppError::bad_request("service name is required")
        .with("usage", "GET /api/ping/{service-name}")
        .with(
            "examples",
            vec!["GET /api/ping/service-a", "GET /api/ping/service-b"],
        )
}

/// Liveness answer of a participating service
pub async fn pong(State(identity): State<ServiceIdentity>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "service": identity.name.as_ref(), "message": "pong" })),
    )
}
