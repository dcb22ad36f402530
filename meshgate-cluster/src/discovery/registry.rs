//! Registry abstractions shared by the read path (discovery) and the
//! write path (registration).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::registration::RegistrationDescriptor;
use crate::error::Result;

/// All services currently known to the registry, with their tags
pub type RegistryCatalog = HashMap<String, Vec<String>>;

/// One healthy, reachable instance of a service.
///
/// Snapshot of a single registry answer; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl ServiceInstance {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port,
            tags: Vec::new(),
            meta: HashMap::new(),
        }
    }

    /// `host:port`, bracketing IPv6 literals
    #[must_use]
    pub fn authority(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Read side of the registry.
///
/// Implementations must not cache: every call reflects the registry's
/// current view.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Instances of `service` currently passing their health checks.
    ///
    /// An empty answer is an error (`Error::NoHealthyInstances`).
    async fn healthy_instances(&self, service: &str) -> Result<Vec<ServiceInstance>>;

    /// Every service name known to the registry. Empty is a valid answer.
    async fn catalog(&self) -> Result<RegistryCatalog>;
}

/// Write side of the registry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, descriptor: &RegistrationDescriptor) -> Result<()>;

    async fn deregister(&self, service_id: &str) -> Result<()>;
}
