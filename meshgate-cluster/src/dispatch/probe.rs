//! Liveness probe dispatch
//!
//! Issues a single `GET` against an instance's well-known liveness path and
//! normalizes the answer. A transport failure fails the probe; a body that is
//! not a JSON object does not, since any response proves the instance is up.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::discovery::ServiceInstance;
use crate::error::{Error, Result};

/// Key under which a non-JSON body is preserved
pub const RAW_BODY_KEY: &str = "raw";

/// Probe dispatcher configuration
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub scheme: String,
    /// Liveness path exposed by every participating service
    pub path: String,
    pub timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            path: "/ping".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Normalized outcome of one probe round trip
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status_code: u16,
    /// Decoded body; `None` when the instance answered with an empty body
    pub body: Option<Map<String, Value>>,
    /// First value of each response header
    pub headers: HashMap<String, String>,
    /// Set when the body was not a JSON object and was wrapped under [`RAW_BODY_KEY`]
    pub raw_fallback: bool,
}

/// Sends the liveness probe to one instance
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, instance: &ServiceInstance) -> Result<ProbeResponse>;
}

/// Decode a probe body into a JSON object.
///
/// Returns the mapping and whether the raw-text fallback was used.
#[must_use]
pub fn decode_body(bytes: &[u8]) -> (Option<Map<String, Value>>, bool) {
    if bytes.is_empty() {
        return (None, false);
    }

    match serde_json::from_slice::<Map<String, Value>>(bytes) {
        Ok(map) => (Some(map), false),
        Err(_) => {
            let mut map = Map::new();
            map.insert(
                RAW_BODY_KEY.to_string(),
                Value::String(String::from_utf8_lossy(bytes).into_owned()),
            );
            (Some(map), true)
        }
    }
}

/// HTTP implementation of [`Prober`]
pub struct HttpProber {
    client: Client,
    settings: ProbeSettings,
}

impl HttpProber {
    pub fn new(mut settings: ProbeSettings) -> Result<Self> {
        if !settings.path.starts_with('/') {
            settings.path.insert(0, '/');
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build probe HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    /// URL the probe for `instance` is sent to
    #[must_use]
    pub fn probe_url(&self, instance: &ServiceInstance) -> String {
        format!(
            "{}://{}{}",
            self.settings.scheme,
            instance.authority(),
            self.settings.path
        )
    }

    fn transport_error(&self, instance: &ServiceInstance, url: &str, err: &reqwest::Error) -> Error {
        let reason = if err.is_timeout() {
            format!("request timed out after {:?}", self.settings.timeout)
        } else {
            err.to_string()
        };

        Error::Transport {
            service: instance.name.clone(),
            url: url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, instance: &ServiceInstance) -> Result<ProbeResponse> {
        let url = self.probe_url(instance);

        tracing::debug!(service = %instance.name, url = %url, "Sending liveness probe");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(instance, &url, &e))?;

        let status_code = response.status().as_u16();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(instance, &url, &e))?;

        let (body, raw_fallback) = decode_body(&bytes);
        if raw_fallback {
            tracing::warn!(
                service = %instance.name,
                url = %url,
                status = status_code,
                "Probe response is not a JSON object, keeping raw text"
            );
        }

        tracing::debug!(service = %instance.name, status = status_code, "Probe response received");

        Ok(ProbeResponse {
            status_code,
            body,
            headers,
            raw_fallback,
        })
    }
}
