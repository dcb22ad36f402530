use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub consul: ConsulConfig,
    pub probe: ProbeConfig,
    pub registration: RegistrationConfig,
    pub logging: LoggingConfig,
}

/// This process: its logical name and where it listens / can be reached
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    /// Bind address
    pub host: String,
    pub port: u16,
    /// Address published to the registry; empty means `host`
    pub register_address: String,
    /// Address the registry health-checks; empty means `register_address`
    pub health_check_address: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "api-gateway".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            register_address: String::new(),
            health_check_address: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub token: Option<String>,
    pub datacenter: Option<String>,
    /// Per-request timeout, e.g. "5s"
    pub timeout: String,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8500,
            scheme: "http".to_string(),
            token: None,
            datacenter: None,
            timeout: "5s".to_string(),
        }
    }
}

impl ConsulConfig {
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub scheme: String,
    pub path: String,
    pub timeout: String,
    /// Concurrent probes while pinging all services
    pub max_concurrency: usize,
    /// Catalog entry that belongs to the registry itself
    pub reserved_service: String,
    /// Instance selection: "random" or "round_robin"
    pub strategy: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            path: "/ping".to_string(),
            timeout: "30s".to_string(),
            max_concurrency: 16,
            reserved_service: "consul".to_string(),
            strategy: "random".to_string(),
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub tags: Vec<String>,
    /// Extra metadata; empty uses the built-in defaults
    pub meta: HashMap<String, String>,
    pub check_interval: String,
    pub check_timeout: String,
    pub deregister_after: String,
    pub deregister_on_shutdown: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            tags: vec!["api".to_string(), "rest".to_string(), "microservice".to_string()],
            meta: HashMap::new(),
            check_interval: "10s".to_string(),
            check_timeout: "3s".to_string(),
            deregister_after: "30s".to_string(),
            deregister_on_shutdown: true,
        }
    }
}

impl RegistrationConfig {
    #[must_use]
    pub fn check_interval_duration(&self) -> Duration {
        parse_duration(&self.check_interval).unwrap_or(Duration::from_secs(10))
    }

    #[must_use]
    pub fn check_timeout_duration(&self) -> Duration {
        parse_duration(&self.check_timeout).unwrap_or(Duration::from_secs(3))
    }

    #[must_use]
    pub fn deregister_after_duration(&self) -> Duration {
        parse_duration(&self.deregister_after).unwrap_or(Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Parse a human duration such as "10s", "1m 30s" or "500ms"
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value.trim()).map_err(|e| format!("invalid duration '{value}': {e}"))
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. `CONSUL_HOST` / `CONSUL_PORT` / `CONSUL_SCHEME` (highest priority)
    /// 2. Environment variables (`MESHGATE_CONSUL__HOST`, `MESHGATE_APP__PORT`, ...)
    /// 3. Config file (if provided; must exist)
    /// 4. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(Path::new(path)).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("MESHGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Variables understood by every service in the mesh
        builder = builder
            .set_override_option("consul.host", std::env::var("CONSUL_HOST").ok())?
            .set_override_option("consul.port", std::env::var("CONSUL_PORT").ok())?
            .set_override_option("consul.scheme", std::env::var("CONSUL_SCHEME").ok())?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// HTTP bind address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }

    /// Consul agent base URL
    #[must_use]
    pub fn consul_address(&self) -> String {
        let host = &self.consul.host;
        if host.contains(':') && !host.starts_with('[') {
            format!("{}://[{host}]:{}", self.consul.scheme, self.consul.port)
        } else {
            format!("{}://{host}:{}", self.consul.scheme, self.consul.port)
        }
    }

    /// Check every setting, collecting all problems
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.app.name.trim().is_empty() {
            errors.push("app.name must not be empty".to_string());
        } else if self.app.name.contains('/') || self.app.name.contains(char::is_whitespace) {
            errors.push(format!("app.name '{}' must be URL-path-safe", self.app.name));
        }
        if self.app.port == 0 {
            errors.push("app.port must not be 0".to_string());
        }

        if self.consul.host.trim().is_empty() {
            errors.push("consul.host must not be empty".to_string());
        }
        if self.consul.port == 0 {
            errors.push("consul.port must not be 0".to_string());
        }
        if !matches!(self.consul.scheme.as_str(), "http" | "https") {
            errors.push(format!("consul.scheme '{}' must be http or https", self.consul.scheme));
        }
        if !matches!(self.probe.scheme.as_str(), "http" | "https") {
            errors.push(format!("probe.scheme '{}' must be http or https", self.probe.scheme));
        }
        if !self.probe.path.starts_with('/') {
            errors.push(format!("probe.path '{}' must start with '/'", self.probe.path));
        }
        if !matches!(
            self.probe.strategy.to_lowercase().as_str(),
            "random" | "round_robin" | "round-robin" | "roundrobin"
        ) {
            errors.push(format!(
                "probe.strategy '{}' must be random or round_robin",
                self.probe.strategy
            ));
        }
        if self.probe.max_concurrency == 0 {
            errors.push("probe.max_concurrency must be at least 1".to_string());
        }

        for (key, value) in [
            ("consul.timeout", &self.consul.timeout),
            ("probe.timeout", &self.probe.timeout),
            ("registration.check_interval", &self.registration.check_interval),
            ("registration.check_timeout", &self.registration.check_timeout),
            ("registration.deregister_after", &self.registration.deregister_after),
        ] {
            if let Err(e) = parse_duration(value) {
                errors.push(format!("{key}: {e}"));
            }
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!("logging.format '{}' must be json or pretty", self.logging.format));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
