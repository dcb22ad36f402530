//! Registry browsing and fan-out ping endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::http::{error::AppResult, AppError, GatewayState};

pub fn create_discovery_router() -> Router<GatewayState> {
    Router::new()
        .route("/discovery/services", get(list_services))
        .route("/discovery/ping-all", get(ping_all_services))
}

/// Every service name in the registry catalog with its tags
pub async fn list_services(State(state): State<GatewayState>) -> AppResult<Json<Value>> {
    let services = state
        .dispatcher
        .list_services()
        .await
        .map_err(|e| AppError::upstream("failed to get services", &e))?;

    Ok(Json(json!({
        "count": services.len(),
        "services": services,
        "message": "Available services in Consul registry",
    })))
}

/// Ping every registered service; individual failures are reported inline
pub async fn ping_all_services(State(state): State<GatewayState>) -> AppResult<Json<Value>> {
    let results = state
        .dispatcher
        .ping_all()
        .await
        .map_err(|e| AppError::upstream("failed to ping all services", &e))?;

    Ok(Json(json!({
        "count": results.len(),
        "results": results,
        "message": "Ping results for all discovered services",
    })))
}
