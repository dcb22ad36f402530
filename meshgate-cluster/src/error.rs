//! Error types for discovery and dispatch

use thiserror::Error;

/// Discovery and dispatch error types
#[derive(Debug, Error)]
pub enum Error {
    /// Registry unreachable or returned an unusable answer
    #[error("Service discovery failed for {service}: {reason}")]
    Discovery { service: String, reason: String },

    /// Registry answered, but no instance of the service passes its health check
    #[error("No healthy instances of service {0} found")]
    NoHealthyInstances(String),

    /// Probe request could not be completed (connect failure, timeout, read error)
    #[error("Failed to ping service {service} at {url}: {reason}")]
    Transport {
        service: String,
        url: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn discovery(service: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Discovery {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// True for registry-side failures, including an empty healthy set
    #[must_use]
    pub const fn is_discovery(&self) -> bool {
        matches!(self, Self::Discovery { .. } | Self::NoHealthyInstances(_))
    }

    /// True when the probe itself failed on the network
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Result type for discovery and dispatch operations
pub type Result<T> = std::result::Result<T, Error>;
