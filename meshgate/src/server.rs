use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use meshgate_api::{create_gateway_router, create_service_router, GatewayState};
use meshgate_cluster::{ConsulRegistry, RegistrationPublisher};
use meshgate_core::Config;

use crate::components;

/// Serve the gateway routes until a shutdown signal arrives
pub async fn run_gateway(config: &Config) -> Result<()> {
    let dispatcher = components::build_dispatcher(config)?;
    let state = GatewayState::new(&config.app.name, Arc::new(dispatcher));

    info!("Service discovery endpoints:");
    info!("  GET /discovery/services         list services in Consul");
    info!("  GET /discovery/ping-all         ping every registered service");
    info!("  GET /api/ping/{{service-name}}   ping one service");

    serve(create_gateway_router(state), &config.http_address()).await
}

/// Register with Consul, serve the liveness routes, deregister on the way out
pub async fn run_service(config: &Config) -> Result<()> {
    let registry = ConsulRegistry::new(components::consul_settings(config))
        .context("Failed to create Consul client")?;
    let publisher = RegistrationPublisher::new(Arc::new(registry));

    let descriptor = publisher
        .register(&components::registration_params(config))
        .await
        .context("Failed to register service with Consul")?;

    let served = serve(create_service_router(&config.app.name), &config.http_address()).await;

    if config.registration.deregister_on_shutdown {
        if let Err(e) = publisher.deregister(&descriptor).await {
            // Consul drops the instance after deregister_after anyway
            warn!(service_id = %descriptor.id, error = %e, "Failed to deregister service");
        }
    }

    served
}

async fn serve(router: Router, address: &str) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {address}"))?;

    info!("HTTP server listening on {}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C, starting graceful shutdown"); }
        () = terminate => { info!("Received SIGTERM, starting graceful shutdown"); }
    }
}
