//! Discovery-and-dispatch orchestration
//!
//! Turns a logical service name into a live probe call:
//! registry lookup -> instance selection -> probe -> [`ProbeResult`].
//! [`Dispatcher::ping_all`] repeats this for every catalog entry and records
//! each outcome independently.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::probe::Prober;
use crate::discovery::{InstanceSelector, RegistryCatalog, ServiceInstance, ServiceRegistry};
use crate::error::{Error, Result};

/// Status recorded for a service whose ping failed inside [`Dispatcher::ping_all`]
pub const FAILURE_STATUS: u16 = 500;

/// Outcome of pinging one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub service: String,
    pub message: String,
    /// Probed instance; `None` when the ping failed before or during dispatch
    pub instance: Option<ServiceInstance>,
    pub status_code: Option<u16>,
    pub raw_response: Option<Map<String, Value>>,
}

impl ProbeResult {
    fn failure(service: &str, err: &Error) -> Self {
        Self {
            service: service.to_string(),
            message: format!("Failed to ping {service}: {err}"),
            instance: None,
            status_code: Some(FAILURE_STATUS),
            raw_response: None,
        }
    }
}

/// One [`ProbeResult`] per discovered service name
pub type AggregateResult = HashMap<String, ProbeResult>;

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Catalog entry the registry keeps for itself; never pinged
    pub reserved_service: String,
    /// Upper bound on concurrent pings during [`Dispatcher::ping_all`]
    pub max_concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reserved_service: "consul".to_string(),
            max_concurrency: 16,
        }
    }
}

/// Composes registry, selector and prober
pub struct Dispatcher {
    registry: Arc<dyn ServiceRegistry>,
    selector: Arc<dyn InstanceSelector>,
    prober: Arc<dyn Prober>,
    config: DispatcherConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        selector: Arc<dyn InstanceSelector>,
        prober: Arc<dyn Prober>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            selector,
            prober,
            config,
        }
    }

    /// All services currently known to the registry
    pub async fn list_services(&self) -> Result<RegistryCatalog> {
        let catalog = self.registry.catalog().await?;
        tracing::info!(services = catalog.len(), "Found services in registry");
        Ok(catalog)
    }

    /// Discover one healthy instance of `service` and probe it.
    ///
    /// Discovery and transport errors propagate unchanged: no retry, no
    /// fallback to another instance.
    pub async fn ping_one(&self, service: &str) -> Result<ProbeResult> {
        tracing::info!(service = %service, "Discovering service");

        let instances = self.registry.healthy_instances(service).await?;
        if instances.is_empty() {
            return Err(Error::NoHealthyInstances(service.to_string()));
        }

        let instance = self.selector.select(&instances)?;

        tracing::info!(
            service = %service,
            instance_id = %instance.id,
            address = %instance.authority(),
            "Found service instance"
        );

        let response = self.prober.probe(&instance).await?;

        tracing::info!(
            service = %service,
            status = response.status_code,
            content_type = response.headers.get("content-type").map_or("-", String::as_str),
            raw_fallback = response.raw_fallback,
            "Received probe response"
        );

        Ok(ProbeResult {
            service: service.to_string(),
            message: format!("Successfully pinged {service}"),
            instance: Some(instance),
            status_code: Some(response.status_code),
            raw_response: response.body,
        })
    }

    /// Ping every service in the catalog except the registry's own entry.
    ///
    /// Only a failing catalog query aborts; a failing service is recorded
    /// with status [`FAILURE_STATUS`] and the rest are still pinged.
    pub async fn ping_all(&self) -> Result<AggregateResult> {
        tracing::info!("Discovering and pinging all services");

        let catalog = self.list_services().await?;
        let names: Vec<String> = catalog
            .into_keys()
            .filter(|name| *name != self.config.reserved_service)
            .collect();

        let concurrency = self.config.max_concurrency.clamp(1, names.len().max(1));

        let results: AggregateResult = stream::iter(names)
            .map(|name| async move {
                let result = match self.ping_one(&name).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(service = %name, error = %e, "Failed to ping service");
                        ProbeResult::failure(&name, &e)
                    }
                };
                (name, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let failed = results
            .values()
            .filter(|r| r.status_code == Some(FAILURE_STATUS) && r.instance.is_none())
            .count();
        tracing::info!(services = results.len(), failed, "Finished pinging all services");

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::load_balancer::MockInstanceSelector;
    use crate::discovery::registry::MockServiceRegistry;
    use crate::discovery::{LoadBalancer, LoadBalancingStrategy};
    use crate::dispatch::probe::{MockProber, ProbeResponse};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn instance(name: &str, n: u8) -> ServiceInstance {
        ServiceInstance::new(format!("{name}-10.0.0.{n}-3000"), name, format!("10.0.0.{n}"), 3000)
    }

    fn pong(status: u16, service: &str) -> ProbeResponse {
        let body = json!({ "service": service, "message": "pong" });
        ProbeResponse {
            status_code: status,
            body: body.as_object().cloned(),
            headers: HashMap::new(),
            raw_fallback: false,
        }
    }

    fn catalog(names: &[&str]) -> RegistryCatalog {
        names.iter().map(|n| ((*n).to_string(), Vec::new())).collect()
    }

    fn dispatcher(registry: MockServiceRegistry, prober: MockProber) -> Dispatcher {
        Dispatcher::new(
            Arc::new(registry),
            Arc::new(LoadBalancer::default()),
            Arc::new(prober),
            DispatcherConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ping_one_returns_reported_instance() {
        let candidates = vec![instance("service-a", 1), instance("service-a", 2)];
        let reported = candidates.clone();

        let mut registry = MockServiceRegistry::new();
        registry
            .expect_healthy_instances()
            .withf(|name: &str| name == "service-a")
            .returning(move |_| Ok(candidates.clone()));

        let mut prober = MockProber::new();
        prober.expect_probe().returning(|i| Ok(pong(200, &i.name)));

        let result = dispatcher(registry, prober).ping_one("service-a").await.unwrap();

        assert_eq!(result.service, "service-a");
        assert_eq!(result.message, "Successfully pinged service-a");
        assert_eq!(result.status_code, Some(200));
        assert!(reported.contains(result.instance.as_ref().unwrap()));
        assert_eq!(result.raw_response.unwrap()["message"], "pong");
    }

    #[tokio::test]
    async fn test_ping_one_probes_selected_instance() {
        let mut registry = MockServiceRegistry::new();
        registry
            .expect_healthy_instances()
            .returning(|_| Ok(vec![instance("service-a", 1), instance("service-a", 2)]));

        let mut selector = MockInstanceSelector::new();
        selector
            .expect_select()
            .times(1)
            .returning(|instances| Ok(instances[1].clone()));

        let mut prober = MockProber::new();
        prober
            .expect_probe()
            .withf(|i| i.address == "10.0.0.2")
            .times(1)
            .returning(|i| Ok(pong(200, &i.name)));

        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(selector),
            Arc::new(prober),
            DispatcherConfig::default(),
        );
        let result = dispatcher.ping_one("service-a").await.unwrap();
        assert_eq!(result.instance.unwrap().address, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_ping_one_single_instance_is_stable() {
        let only = instance("service-a", 9);
        let expected = only.clone();

        let mut registry = MockServiceRegistry::new();
        registry
            .expect_healthy_instances()
            .times(10)
            .returning(move |_| Ok(vec![only.clone()]));

        let mut prober = MockProber::new();
        prober.expect_probe().returning(|i| Ok(pong(200, &i.name)));

        let dispatcher = dispatcher(registry, prober);
        for _ in 0..10 {
            let result = dispatcher.ping_one("service-a").await.unwrap();
            assert_eq!(result.instance.as_ref(), Some(&expected));
        }
    }

    #[tokio::test]
    async fn test_ping_one_no_healthy_instances() {
        let mut registry = MockServiceRegistry::new();
        registry
            .expect_healthy_instances()
            .returning(|name| Err(Error::NoHealthyInstances(name.to_string())));

        let mut prober = MockProber::new();
        prober.expect_probe().never();

        let err = dispatcher(registry, prober).ping_one("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NoHealthyInstances(ref name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_ping_one_empty_registry_answer_is_discovery_error() {
        let mut registry = MockServiceRegistry::new();
        registry.expect_healthy_instances().returning(|_| Ok(Vec::new()));

        let mut prober = MockProber::new();
        prober.expect_probe().never();

        let err = dispatcher(registry, prober).ping_one("ghost").await.unwrap_err();
        assert!(err.is_discovery());
    }

    #[tokio::test]
    async fn test_ping_one_transport_error_propagates() {
        let mut registry = MockServiceRegistry::new();
        registry
            .expect_healthy_instances()
            .returning(|_| Ok(vec![instance("service-a", 1), instance("service-a", 2)]));

        let mut prober = MockProber::new();
        prober.expect_probe().times(1).returning(|i| {
            Err(Error::Transport {
                service: i.name.clone(),
                url: format!("http://{}/ping", i.authority()),
                reason: "connection refused".to_string(),
            })
        });

        let err = dispatcher(registry, prober).ping_one("service-a").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_ping_all_skips_reserved_entry() {
        let mut registry = MockServiceRegistry::new();
        registry
            .expect_catalog()
            .returning(|| Ok(catalog(&["consul", "service-a", "service-b"])));
        registry
            .expect_healthy_instances()
            .returning(|name| Ok(vec![instance(name, 1)]));

        let mut prober = MockProber::new();
        prober
            .expect_probe()
            .withf(|i| i.name != "consul")
            .returning(|i| Ok(pong(200, &i.name)));

        let results = dispatcher(registry, prober).ping_all().await.unwrap();

        let keys: HashSet<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(keys, HashSet::from(["service-a", "service-b"]));
        assert!(results.values().all(|r| r.status_code == Some(200)));
    }

    #[tokio::test]
    async fn test_ping_all_empty_catalog() {
        let mut registry = MockServiceRegistry::new();
        registry.expect_catalog().returning(|| Ok(RegistryCatalog::new()));

        let results = dispatcher(registry, MockProber::new()).ping_all().await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_ping_all_only_reserved_entry() {
        let mut registry = MockServiceRegistry::new();
        registry.expect_catalog().returning(|| Ok(catalog(&["consul"])));
        registry.expect_healthy_instances().never();

        let results = dispatcher(registry, MockProber::new()).ping_all().await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_ping_all_isolates_failures() {
        let mut registry = MockServiceRegistry::new();
        registry
            .expect_catalog()
            .returning(|| Ok(catalog(&["consul", "service-a", "service-b", "service-c"])));
        registry.expect_healthy_instances().returning(|name| match name {
            "service-c" => Err(Error::NoHealthyInstances(name.to_string())),
            _ => Ok(vec![instance(name, 1)]),
        });

        let mut prober = MockProber::new();
        prober.expect_probe().returning(|i| match i.name.as_str() {
            "service-b" => Err(Error::Transport {
                service: i.name.clone(),
                url: "http://10.0.0.1:3000/ping".to_string(),
                reason: "connection refused".to_string(),
            }),
            _ => Ok(pong(200, &i.name)),
        });

        let results = dispatcher(registry, prober).ping_all().await.unwrap();
        assert_eq!(results.len(), 3);

        let a = &results["service-a"];
        assert_eq!(a.status_code, Some(200));
        assert!(a.instance.is_some());

        let b = &results["service-b"];
        assert_eq!(b.status_code, Some(FAILURE_STATUS));
        assert!(b.instance.is_none());
        assert!(b.message.starts_with("Failed to ping service-b"));
        assert!(b.message.contains("connection refused"));

        let c = &results["service-c"];
        assert_eq!(c.status_code, Some(FAILURE_STATUS));
        assert!(c.message.contains("No healthy instances of service service-c"));
    }

    #[tokio::test]
    async fn test_ping_all_keeps_real_error_statuses() {
        let mut registry = MockServiceRegistry::new();
        registry.expect_catalog().returning(|| Ok(catalog(&["service-a"])));
        registry
            .expect_healthy_instances()
            .returning(|name| Ok(vec![instance(name, 1)]));

        let mut prober = MockProber::new();
        prober.expect_probe().returning(|i| Ok(pong(503, &i.name)));

        let results = dispatcher(registry, prober).ping_all().await.unwrap();
        assert_eq!(results["service-a"].status_code, Some(503));
        assert!(results["service-a"].instance.is_some());
    }

    #[tokio::test]
    async fn test_ping_all_catalog_failure_aborts() {
        let mut registry = MockServiceRegistry::new();
        registry.expect_catalog().returning(|| {
            Err(Error::Discovery {
                service: "catalog".to_string(),
                reason: "registry unreachable".to_string(),
            })
        });
        registry.expect_healthy_instances().never();

        let err = dispatcher(registry, MockProber::new()).ping_all().await.unwrap_err();
        assert!(err.is_discovery());
    }

    /// Prober that tracks how many probes are in flight at once
    struct SlowProber {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Prober for SlowProber {
        async fn probe(&self, instance: &ServiceInstance) -> Result<ProbeResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(pong(200, &instance.name))
        }
    }

    #[tokio::test]
    async fn test_ping_all_bounds_concurrency() {
        let names: Vec<String> = (0..12).map(|i| format!("service-{i}")).collect();
        let listed = names.clone();

        let mut registry = MockServiceRegistry::new();
        registry
            .expect_catalog()
            .returning(move || Ok(listed.iter().map(|n| (n.clone(), Vec::new())).collect()));
        registry
            .expect_healthy_instances()
            .returning(|name| Ok(vec![instance(name, 1)]));

        let prober = Arc::new(SlowProber {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(LoadBalancer::new(LoadBalancingStrategy::Random)),
            prober.clone(),
            DispatcherConfig {
                max_concurrency: 3,
                ..DispatcherConfig::default()
            },
        );

        let results = dispatcher.ping_all().await.unwrap();
        assert_eq!(results.len(), names.len());

        let peak = prober.peak.load(Ordering::SeqCst);
        assert!((2..=3).contains(&peak), "peak concurrency was {peak}");
    }

    #[test]
    fn test_probe_result_serialization() {
        let result = ProbeResult::failure("service-b", &Error::NoHealthyInstances("service-b".to_string()));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["service"], "service-b");
        assert_eq!(json["status_code"], 500);
        assert!(json["instance"].is_null());
        assert!(json["raw_response"].is_null());
    }
}
