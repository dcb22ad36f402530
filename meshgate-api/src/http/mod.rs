//! HTTP routers
//!
//! Thin request layer over [`meshgate_cluster::Dispatcher`]: path parameters
//! in, JSON envelopes out. Status mapping lives here, never in the core.

pub mod discovery;
pub mod error;
pub mod health;
pub mod ping;

use axum::{extract::FromRef, Router};
use meshgate_cluster::Dispatcher;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Who is answering: reported by `/health` and the liveness endpoint
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    pub name: Arc<str>,
    pub role: &'static str,
}

impl ServiceIdentity {
    #[must_use]
    pub fn gateway(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            role: "API Gateway",
        }
    }

    #[must_use]
    pub fn service(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            role: "Service",
        }
    }
}

/// Gateway router state
#[derive(Clone)]
pub struct GatewayState {
    pub identity: ServiceIdentity,
    pub dispatcher: Arc<Dispatcher>,
}

impl GatewayState {
    #[must_use]
    pub fn new(name: &str, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            identity: ServiceIdentity::gateway(name),
            dispatcher,
        }
    }
}

impl FromRef<GatewayState> for ServiceIdentity {
    fn from_ref(state: &GatewayState) -> Self {
        state.identity.clone()
    }
}

/// Routes served by the gateway role
pub fn create_gateway_router(state: GatewayState) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .merge(discovery::create_discovery_router())
        .merge(ping::create_gateway_ping_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes served by a participating service: liveness plus health
pub fn create_service_router(name: &str) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .merge(ping::create_liveness_router())
        .layer(TraceLayer::new_for_http())
        .with_state(ServiceIdentity::service(name))
}
