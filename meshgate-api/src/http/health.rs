//! Health check endpoint shared by the gateway and service routers

use axum::{
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::http::ServiceIdentity;

/// Health check router
pub fn create_health_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ServiceIdentity: FromRef<S>,
{
    Router::new().route("/health", get(health_check))
}

/// Always healthy while the process is serving
pub async fn health_check(State(identity): State<ServiceIdentity>) -> Json<Value> {
    Json(json!({
        "service": identity.name.as_ref(),
        "status": "healthy",
        "message": format!("{} is running", identity.role),
    }))
}
