//! Load balancing across healthy service instances
//!
//! Picks exactly one instance out of a registry answer. The registry has
//! already filtered out unhealthy instances, so selection only decides
//! *which* healthy instance receives the call.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::registry::ServiceInstance;
use crate::error::{Error, Result};

/// Instance selection policy
#[cfg_attr(test, mockall::automock)]
pub trait InstanceSelector: Send + Sync {
    /// Select one instance. `instances` is expected to be non-empty.
    fn select(&self, instances: &[ServiceInstance]) -> Result<ServiceInstance>;
}

/// Load balancing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    /// Uniform random selection
    #[default]
    Random,
    /// Round-robin over instances ordered by id
    RoundRobin,
}

impl std::str::FromStr for LoadBalancingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "round_robin" | "round-robin" | "roundrobin" => Ok(Self::RoundRobin),
            other => Err(Error::Configuration(format!(
                "Unknown load balancing strategy: {other}"
            ))),
        }
    }
}

/// Load balancer for instance selection
///
/// Holds a single random source for the lifetime of the process instead of
/// reseeding per call. Tests inject a seeded source through [`LoadBalancer::with_seed`].
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    rng: Mutex<StdRng>,
    round_robin_index: AtomicUsize,
}

impl LoadBalancer {
    /// Create a new load balancer seeded from the OS
    #[must_use]
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self::with_rng(strategy, StdRng::from_os_rng())
    }

    /// Create a load balancer with a deterministic random source
    #[must_use]
    pub fn with_seed(strategy: LoadBalancingStrategy, seed: u64) -> Self {
        Self::with_rng(strategy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(strategy: LoadBalancingStrategy, rng: StdRng) -> Self {
        Self {
            strategy,
            rng: Mutex::new(rng),
            round_robin_index: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(LoadBalancingStrategy::Random)
    }
}

impl InstanceSelector for LoadBalancer {
    fn select(&self, instances: &[ServiceInstance]) -> Result<ServiceInstance> {
        let Some(first) = instances.first() else {
            return Err(Error::NoHealthyInstances("<unknown>".to_string()));
        };

        if instances.len() == 1 {
            return Ok(first.clone());
        }

        let selected = match self.strategy {
            LoadBalancingStrategy::Random => {
                let mut rng = self.rng.lock();
                instances
                    .choose(&mut *rng)
                    .ok_or_else(|| Error::NoHealthyInstances(first.name.clone()))?
                    .clone()
            }
            LoadBalancingStrategy::RoundRobin => {
                // Sort by id for stable ordering across calls
                let mut sorted: Vec<&ServiceInstance> = instances.iter().collect();
                sorted.sort_by(|a, b| a.id.cmp(&b.id));
                let index = self.round_robin_index.fetch_add(1, Ordering::AcqRel) % sorted.len();
                sorted[index].clone()
            }
        };

        tracing::trace!(
            service = %selected.name,
            instance_id = %selected.id,
            candidates = instances.len(),
            strategy = ?self.strategy,
            "Selected service instance"
        );

        Ok(selected)
    }
}
