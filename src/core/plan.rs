/// Resolved verification plan
///
/// What a single run checks, built once from configuration and never changed afterwards.

use serde::Serialize;
use std::time::Duration;

use crate::core::config::EnvRequirements;
use crate::core::functional::FunctionalCheck;
use crate::core::probe::{HttpMethod, ProbeRequest};
use crate::core::report::Expectations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Container,
    HttpEndpoint,
}

/// One declared target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    /// Base URL for HTTP services; `None` for containers
    pub url: Option<String>,
    pub kind: ServiceKind,
    pub required: bool,
}

impl ServiceSpec {
    pub fn container(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            url: None,
            kind: ServiceKind::Container,
            required,
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            kind: ServiceKind::HttpEndpoint,
            required,
        }
    }

    /// HTTP probing only makes sense for http(s) URLs; a cache at `redis://` has no such check
    pub fn speaks_http(&self) -> bool {
        self.url
            .as_deref()
            .map_or(false, |u| u.starts_with("http://") || u.starts_with("https://"))
    }
}

/// One API endpoint, resolved to a full URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSpec {
    /// Report key, the path unless configured otherwise
    pub key: String,
    pub service: String,
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<serde_json::Value>,
    pub required: bool,
}

impl EndpointSpec {
    pub fn request(&self, timeout: Duration) -> ProbeRequest {
        ProbeRequest {
            url: self.url.clone(),
            method: self.method,
            body: self.body.clone(),
            timeout,
        }
    }
}

/// Timing and fan-out for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Pause after containers are confirmed running; zero skips the wait
    pub warmup: Duration,
    /// Per-request timeout for service and endpoint probes
    pub request_timeout: Duration,
    /// Backstop for the whole run
    pub deadline: Duration,
    /// Concurrent endpoint probes; 1 keeps them sequential
    pub max_concurrency: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(300),
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerificationPlan {
    pub containers: Vec<ServiceSpec>,
    pub services: Vec<ServiceSpec>,
    pub endpoints: Vec<EndpointSpec>,
    pub functional: Option<FunctionalCheck>,
    pub environment: EnvRequirements,
}

impl VerificationPlan {
    pub fn container_names(&self) -> Vec<String> {
        self.containers.iter().map(|c| c.name.clone()).collect()
    }

    /// Every declared target, containers first
    pub fn service_specs(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.containers.iter().chain(self.services.iter())
    }

    /// Required targets the finalized report has to account for
    pub fn expectations(&self) -> Expectations {
        Expectations {
            services: self
                .service_specs()
                .filter(|s| s.required)
                .map(|s| s.name.clone())
                .collect(),
            endpoints: self
                .endpoints
                .iter()
                .filter(|e| e.required)
                .map(|e| e.key.clone())
                .collect(),
            functional: self.functional.as_ref().map(|f| f.name.clone()),
        }
    }
}
