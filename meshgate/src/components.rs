//! Translation from file/env configuration to core component settings

use anyhow::{Context, Result};
use std::sync::Arc;

use meshgate_cluster::{
    discovery::HealthCheckPolicy, ConsulRegistry, ConsulSettings, Dispatcher, DispatcherConfig,
    HttpProber, LoadBalancer, LoadBalancingStrategy, ProbeSettings, RegistrationParams,
};
use meshgate_core::Config;

pub fn consul_settings(config: &Config) -> ConsulSettings {
    ConsulSettings {
        host: config.consul.host.clone(),
        port: config.consul.port,
        scheme: config.consul.scheme.clone(),
        token: config.consul.token.clone().filter(|t| !t.is_empty()),
        datacenter: config.consul.datacenter.clone().filter(|dc| !dc.is_empty()),
        timeout: config.consul.timeout_duration(),
    }
}

pub fn probe_settings(config: &Config) -> ProbeSettings {
    ProbeSettings {
        scheme: config.probe.scheme.clone(),
        path: config.probe.path.clone(),
        timeout: config.probe.timeout_duration(),
    }
}

pub fn dispatcher_config(config: &Config) -> DispatcherConfig {
    DispatcherConfig {
        reserved_service: config.probe.reserved_service.clone(),
        max_concurrency: config.probe.max_concurrency,
    }
}

pub fn registration_params(config: &Config) -> RegistrationParams {
    let mut params = RegistrationParams::new(&config.app.name, &config.app.host, config.app.port);

    params.register_address = Some(config.app.register_address.clone()).filter(|a| !a.is_empty());
    params.health_check_address =
        Some(config.app.health_check_address.clone()).filter(|a| !a.is_empty());

    if !config.registration.tags.is_empty() {
        params.tags.clone_from(&config.registration.tags);
    }
    params.meta.extend(config.registration.meta.clone());

    params.check = HealthCheckPolicy {
        scheme: config.probe.scheme.clone(),
        path: config.probe.path.clone(),
        interval: config.registration.check_interval_duration(),
        timeout: config.registration.check_timeout_duration(),
        deregister_after: config.registration.deregister_after_duration(),
    };

    params
}

/// Registry, selector and prober wired into one dispatcher
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let registry = ConsulRegistry::new(consul_settings(config)).context("Failed to create Consul client")?;
    let strategy: LoadBalancingStrategy = config
        .probe
        .strategy
        .parse()
        .context("Invalid load balancing strategy")?;
    let prober = HttpProber::new(probe_settings(config)).context("Failed to create probe client")?;
    let selector = LoadBalancer::new(strategy);

    tracing::info!(
        consul = %registry.base_url(),
        strategy = ?selector.strategy(),
        max_concurrency = config.probe.max_concurrency,
        "Service discovery configured"
    );

    Ok(Dispatcher::new(
        Arc::new(registry),
        Arc::new(selector),
        Arc::new(prober),
        dispatcher_config(config),
    ))
}
