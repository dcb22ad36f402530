//! Self-registration of a service instance
//!
//! A service joining the mesh publishes its name, reachable address and a
//! health-check descriptor. The registry probes the declared URL and drops
//! the instance from discovery results while it fails, deregistering it
//! completely once it has been critical for `deregister_after`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::registry::Registrar;
use crate::error::Result;

/// How the registry should health-check a registered instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub scheme: String,
    pub path: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub deregister_after: Duration,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            path: "/ping".to_string(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(3),
            deregister_after: Duration::from_secs(30),
        }
    }
}

/// Inputs for building a [`RegistrationDescriptor`]
#[derive(Debug, Clone)]
pub struct RegistrationParams {
    pub name: String,
    /// Address the service listens on (may be `0.0.0.0`)
    pub bind_address: String,
    /// Address other services use to reach this instance; falls back to `bind_address`
    pub register_address: Option<String>,
    /// Address the registry uses for health checks; falls back to the register address
    pub health_check_address: Option<String>,
    pub port: u16,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
    pub check: HealthCheckPolicy,
}

impl RegistrationParams {
    #[must_use]
    pub fn new(name: impl Into<String>, bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            bind_address: bind_address.into(),
            register_address: None,
            health_check_address: None,
            port,
            tags: default_tags(),
            meta: default_meta(),
            check: HealthCheckPolicy::default(),
        }
    }
}

/// Tags published by services that do not configure their own
#[must_use]
pub fn default_tags() -> Vec<String> {
    ["api", "rest", "microservice"].iter().map(ToString::to_string).collect()
}

/// Metadata published by services that do not configure their own
#[must_use]
pub fn default_meta() -> HashMap<String, String> {
    HashMap::from([
        ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ("environment".to_string(), "development".to_string()),
        ("protocol".to_string(), "http".to_string()),
    ])
}

/// Health-check part of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckDescriptor {
    /// Full URL the registry probes
    pub http: String,
    pub path: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub deregister_critical_after: Duration,
}

/// What one service instance publishes about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationDescriptor {
    /// `{name}-{address}-{port}`: one registry entry per physical instance
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
    pub check: HealthCheckDescriptor,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl RegistrationDescriptor {
    /// Build a descriptor, applying address fallbacks.
    ///
    /// Empty strings count as absent.
    #[must_use]
    pub fn build(params: &RegistrationParams) -> Self {
        let register_address = non_empty(params.register_address.as_deref())
            .unwrap_or(params.bind_address.as_str())
            .to_string();
        let health_check_address = non_empty(params.health_check_address.as_deref())
            .unwrap_or(register_address.as_str())
            .to_string();

        let probe_host = if health_check_address.contains(':') && !health_check_address.starts_with('[') {
            format!("[{health_check_address}]")
        } else {
            health_check_address
        };

        let check = HealthCheckDescriptor {
            http: format!(
                "{}://{}:{}{}",
                params.check.scheme, probe_host, params.port, params.check.path
            ),
            path: params.check.path.clone(),
            interval: params.check.interval,
            timeout: params.check.timeout,
            deregister_critical_after: params.check.deregister_after,
        };

        Self {
            id: format!("{}-{}-{}", params.name, register_address, params.port),
            name: params.name.clone(),
            address: register_address,
            port: params.port,
            tags: params.tags.clone(),
            meta: params.meta.clone(),
            check,
        }
    }
}

/// Publishes this instance into the registry
pub struct RegistrationPublisher {
    registrar: Arc<dyn Registrar>,
}

impl RegistrationPublisher {
    #[must_use]
    pub fn new(registrar: Arc<dyn Registrar>) -> Self {
        Self { registrar }
    }

    /// Build the descriptor and submit it to the registry
    pub async fn register(&self, params: &RegistrationParams) -> Result<RegistrationDescriptor> {
        let descriptor = RegistrationDescriptor::build(params);

        self.registrar.register(&descriptor).await?;

        tracing::info!(
            service = %descriptor.name,
            service_id = %descriptor.id,
            bind_address = %format!("{}:{}", params.bind_address, params.port),
            register_address = %format!("{}:{}", descriptor.address, descriptor.port),
            health_check_url = %descriptor.check.http,
            tags = ?descriptor.tags,
            "Service registered"
        );

        Ok(descriptor)
    }

    /// Remove a previously published instance
    pub async fn deregister(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        self.registrar.deregister(&descriptor.id).await?;
        tracing::info!(service_id = %descriptor.id, "Service deregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::registry::MockRegistrar;
    use crate::error::Error;

    #[test]
    fn test_addresses_fall_back_to_bind_address() {
        let params = RegistrationParams::new("service-a", "10.1.0.4", 3000);
        let descriptor = RegistrationDescriptor::build(&params);

        assert_eq!(descriptor.address, "10.1.0.4");
        assert_eq!(descriptor.check.http, "http://10.1.0.4:3000/ping");
        assert_eq!(descriptor.id, "service-a-10.1.0.4-3000");
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        let mut params = RegistrationParams::new("service-a", "10.1.0.4", 3000);
        params.register_address = Some(String::new());
        params.health_check_address = Some("  ".to_string());

        let descriptor = RegistrationDescriptor::build(&params);
        assert_eq!(descriptor.address, "10.1.0.4");
        assert_eq!(descriptor.check.http, "http://10.1.0.4:3000/ping");
    }

    #[test]
    fn test_health_check_falls_back_to_register_address() {
        let mut params = RegistrationParams::new("service-a", "0.0.0.0", 3000);
        params.register_address = Some("service-a".to_string());

        let descriptor = RegistrationDescriptor::build(&params);
        assert_eq!(descriptor.address, "service-a");
        assert_eq!(descriptor.id, "service-a-service-a-3000");
        assert_eq!(descriptor.check.http, "http://service-a:3000/ping");
    }

    #[test]
    fn test_distinct_addresses_are_preserved() {
        let mut params = RegistrationParams::new("service-b", "0.0.0.0", 4000);
        params.register_address = Some("192.168.1.20".to_string());
        params.health_check_address = Some("host.docker.internal".to_string());

        let descriptor = RegistrationDescriptor::build(&params);
        assert_eq!(descriptor.address, "192.168.1.20");
        assert_eq!(descriptor.id, "service-b-192.168.1.20-4000");
        assert_eq!(descriptor.check.http, "http://host.docker.internal:4000/ping");
    }

    #[test]
    fn test_check_policy_is_carried() {
        let mut params = RegistrationParams::new("service-a", "10.1.0.4", 3000);
        params.check.path = "/healthz".to_string();
        params.check.interval = Duration::from_secs(5);

        let descriptor = RegistrationDescriptor::build(&params);
        assert_eq!(descriptor.check.path, "/healthz");
        assert_eq!(descriptor.check.http, "http://10.1.0.4:3000/healthz");
        assert_eq!(descriptor.check.interval, Duration::from_secs(5));
        assert_eq!(descriptor.check.timeout, Duration::from_secs(3));
        assert_eq!(descriptor.check.deregister_critical_after, Duration::from_secs(30));
    }

    #[test]
    fn test_ipv6_health_check_url() {
        let params = RegistrationParams::new("service-a", "fd00::4", 3000);
        let descriptor = RegistrationDescriptor::build(&params);
        assert_eq!(descriptor.check.http, "http://[fd00::4]:3000/ping");
        assert_eq!(descriptor.id, "service-a-fd00::4-3000");
    }

    #[tokio::test]
    async fn test_publisher_submits_descriptor() {
        let mut registrar = MockRegistrar::new();
        registrar
            .expect_register()
            .withf(|d| d.id == "service-a-10.1.0.4-3000" && d.tags == default_tags())
            .times(1)
            .returning(|_| Ok(()));

        let publisher = RegistrationPublisher::new(Arc::new(registrar));
        let descriptor = publisher
            .register(&RegistrationParams::new("service-a", "10.1.0.4", 3000))
            .await
            .unwrap();
        assert_eq!(descriptor.name, "service-a");
    }

    #[tokio::test]
    async fn test_publisher_propagates_registry_failure() {
        let mut registrar = MockRegistrar::new();
        registrar.expect_register().returning(|d| {
            Err(Error::Discovery {
                service: d.id.clone(),
                reason: "connection refused".to_string(),
            })
        });

        let publisher = RegistrationPublisher::new(Arc::new(registrar));
        let err = publisher
            .register(&RegistrationParams::new("service-a", "10.1.0.4", 3000))
            .await
            .unwrap_err();
        assert!(err.is_discovery());
    }

    #[tokio::test]
    async fn test_publisher_deregisters_by_id() {
        let mut registrar = MockRegistrar::new();
        registrar
            .expect_deregister()
            .withf(|id: &str| id == "service-a-10.1.0.4-3000")
            .times(1)
            .returning(|_| Ok(()));

        let publisher = RegistrationPublisher::new(Arc::new(registrar));
        let descriptor = RegistrationDescriptor::build(&RegistrationParams::new("service-a", "10.1.0.4", 3000));
        publisher.deregister(&descriptor).await.unwrap();
    }
}
