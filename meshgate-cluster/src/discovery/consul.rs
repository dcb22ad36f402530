//! Consul-backed registry client
//!
//! Talks to the Consul agent HTTP API:
//! - `GET /v1/health/service/{name}?passing=true` for healthy instances
//! - `GET /v1/catalog/services` for the service catalog
//! - `PUT /v1/agent/service/register` / `PUT /v1/agent/service/deregister/{id}`
//!
//! Nothing is cached; every call re-queries the agent.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::registration::RegistrationDescriptor;
use super::registry::{Registrar, RegistryCatalog, ServiceInstance, ServiceRegistry};
use crate::error::{Error, Result};

/// Characters escaped when a service name or id is placed in a URL path
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Connection settings for the Consul agent
#[derive(Debug, Clone)]
pub struct ConsulSettings {
    pub host: String,
    pub port: u16,
    /// `http` or `https`
    pub scheme: String,
    /// ACL token, sent as `X-Consul-Token`
    pub token: Option<String>,
    pub datacenter: Option<String>,
    /// Upper bound for each registry request
    pub timeout: Duration,
}

impl Default for ConsulSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8500,
            scheme: "http".to_string(),
            token: None,
            datacenter: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ConsulSettings {
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// One row of `/v1/health/service/{name}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    #[serde(default)]
    node: Option<NodeEntry>,
    service: AgentService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeEntry {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

impl HealthEntry {
    fn into_instance(self) -> ServiceInstance {
        let service = self.service;
        // Consul leaves Service.Address empty when the service shares the node address
        let address = if service.address.is_empty() {
            self.node.map(|n| n.address).unwrap_or_default()
        } else {
            service.address
        };

        ServiceInstance {
            id: service.id,
            name: service.service,
            address,
            port: service.port,
            tags: service.tags.unwrap_or_default(),
            meta: service.meta.unwrap_or_default(),
        }
    }
}

/// Body of `PUT /v1/agent/service/register`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
    meta: &'a HashMap<String, String>,
    check: AgentServiceCheck<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck<'a> {
    #[serde(rename = "HTTP")]
    http: &'a str,
    interval: String,
    timeout: String,
    deregister_critical_service_after: String,
}

impl<'a> From<&'a RegistrationDescriptor> for AgentServiceRegistration<'a> {
    fn from(d: &'a RegistrationDescriptor) -> Self {
        Self {
            id: &d.id,
            name: &d.name,
            address: &d.address,
            port: d.port,
            tags: &d.tags,
            meta: &d.meta,
            check: AgentServiceCheck {
                http: &d.check.http,
                interval: go_duration(d.check.interval),
                timeout: go_duration(d.check.timeout),
                deregister_critical_service_after: go_duration(d.check.deregister_critical_after),
            },
        }
    }
}

/// Render a duration the way Consul's Go duration parser accepts it
fn go_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

/// Registry client backed by a Consul agent
pub struct ConsulRegistry {
    client: Client,
    base_url: String,
    token: Option<String>,
    datacenter: Option<String>,
}

impl ConsulRegistry {
    /// Create a new Consul registry client
    pub fn new(settings: ConsulSettings) -> Result<Self> {
        if settings.host.trim().is_empty() {
            return Err(Error::Configuration("Consul host must not be empty".to_string()));
        }
        if !matches!(settings.scheme.as_str(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "Unsupported Consul scheme '{}', expected http or https",
                settings.scheme
            )));
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build Consul HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url(),
            token: settings.token.filter(|t| !t.is_empty()),
            datacenter: settings.datacenter.filter(|dc| !dc.is_empty()),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v1{}", self.base_url, path);
        let mut request = self.client.request(method, url);

        if let Some(ref token) = self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(ref dc) = self.datacenter {
            request = request.query(&[("dc", dc)]);
        }

        request
    }

    /// Send a request, mapping transport failures and non-2xx answers to
    /// discovery errors attributed to `subject`
    async fn send(&self, request: RequestBuilder, subject: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(subject = %subject, error = %e, "Consul request failed");
            Error::discovery(subject, format!("registry unreachable at {}: {e}", self.base_url))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::discovery(
                subject,
                format!("registry returned {status}: {}", body.trim()),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn healthy_instances(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        let path = format!("/health/service/{}", utf8_percent_encode(service, PATH_SEGMENT));
        let request = self.request(Method::GET, &path).query(&[("passing", "true")]);

        let entries: Vec<HealthEntry> = self
            .send(request, service)
            .await?
            .json()
            .await
            .map_err(|e| Error::discovery(service, format!("invalid registry response: {e}")))?;

        if entries.is_empty() {
            return Err(Error::NoHealthyInstances(service.to_string()));
        }

        let instances: Vec<ServiceInstance> = entries.into_iter().map(HealthEntry::into_instance).collect();

        tracing::debug!(
            service = %service,
            instances = instances.len(),
            "Discovered healthy instances"
        );

        Ok(instances)
    }

    async fn catalog(&self) -> Result<RegistryCatalog> {
        const SUBJECT: &str = "catalog";

        let services: HashMap<String, Option<Vec<String>>> = self
            .send(self.request(Method::GET, "/catalog/services"), SUBJECT)
            .await?
            .json()
            .await
            .map_err(|e| Error::discovery(SUBJECT, format!("invalid registry response: {e}")))?;

        let catalog: RegistryCatalog = services
            .into_iter()
            .map(|(name, tags)| (name, tags.unwrap_or_default()))
            .collect();

        tracing::debug!(services = catalog.len(), "Fetched service catalog");

        Ok(catalog)
    }
}

#[async_trait]
impl Registrar for ConsulRegistry {
    async fn register(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        let body = AgentServiceRegistration::from(descriptor);
        let request = self.request(Method::PUT, "/agent/service/register").json(&body);

        self.send(request, &descriptor.id).await?;
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<()> {
        let path = format!(
            "/agent/service/deregister/{}",
            utf8_percent_encode(service_id, PATH_SEGMENT)
        );

        self.send(self.request(Method::PUT, &path), service_id).await?;
        Ok(())
    }
}
