/// HTTP endpoint probing
///
/// One request per probe, no retries. Every failure mode ends up in the returned value.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::core::report::{ProbeResult, ProbeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            body: None,
            timeout,
        }
    }
}

/// Raw outcome of one HTTP call: status code, elapsed time, body or error message
#[derive(Debug, Clone)]
pub struct HttpExchange {
    pub status_code: Option<u16>,
    pub latency: Duration,
    pub outcome: std::result::Result<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl HttpExchange {
    pub fn body(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}

/// Classify an exchange: 2xx healthy, other codes unhealthy, transport failures error
pub fn classify(target: &str, exchange: &HttpExchange) -> ProbeResult {
    let (status, detail) = match (&exchange.outcome, exchange.status_code) {
        (Err(message), _) => (ProbeStatus::Error, message.clone()),
        (Ok(_), Some(code)) if (200..300).contains(&code) => (
            ProbeStatus::Healthy,
            format!("HTTP {} in {}ms", code, exchange.latency.as_millis()),
        ),
        (Ok(_), Some(code)) => (ProbeStatus::Unhealthy, format!("HTTP {}", code)),
        (Ok(_), None) => (ProbeStatus::Error, "response carried no status code".to_string()),
    };

    ProbeResult::new(target, status, exchange.latency, detail, exchange.timestamp)
}

/// Transport seam used by the orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Perform exactly one request; never fails, errors are carried in the exchange
    async fn exchange(&self, request: &ProbeRequest) -> HttpExchange;
}

/// reqwest-backed endpoint probe
#[derive(Clone)]
pub struct EndpointProbe {
    client: Client,
}

impl EndpointProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("stackcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Probe and classify in one step
    pub async fn check(&self, target: &str, request: &ProbeRequest) -> ProbeResult {
        let exchange = self.exchange(request).await;
        classify(target, &exchange)
    }

    async fn send(&self, request: &ProbeRequest) -> std::result::Result<(u16, String), String> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| describe(&e, request.timeout))?;
        let code = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| format!("HTTP {} with unreadable body: {}", code, describe(&e, request.timeout)))?;

        Ok((code, body))
    }
}

fn describe(error: &reqwest::Error, timeout: Duration) -> String {
    if error.is_timeout() {
        format!("timed out after {}", humantime::format_duration(timeout))
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        format!("request failed: {}", error)
    }
}

#[async_trait]
impl HttpProbe for EndpointProbe {
    async fn exchange(&self, request: &ProbeRequest) -> HttpExchange {
        let timestamp = Utc::now();
        let started = Instant::now();

        // Backstop in case the transport ignores its own deadline
        let grace = request.timeout + Duration::from_millis(500);
        let outcome = match tokio::time::timeout(grace, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(format!("timed out after {}", humantime::format_duration(request.timeout))),
        };
        let latency = started.elapsed();

        let exchange = match outcome {
            Ok((code, body)) => HttpExchange {
                status_code: Some(code),
                latency,
                outcome: Ok(body),
                timestamp,
            },
            Err(message) => HttpExchange {
                status_code: None,
                latency,
                outcome: Err(message),
                timestamp,
            },
        };

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = ?exchange.status_code,
            latency_ms = latency.as_millis() as u64,
            "probe finished"
        );

        exchange
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(code: Option<u16>, outcome: std::result::Result<&str, &str>) -> HttpExchange {
        HttpExchange {
            status_code: code,
            latency: Duration::from_millis(42),
            outcome: outcome.map(str::to_string).map_err(str::to_string),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_classify_success() {
        let result = classify("/health", &exchange(Some(204), Ok("")));
        assert_eq!(result.status, ProbeStatus::Healthy);
        assert_eq!(result.detail, "HTTP 204 in 42ms");
        assert_eq!(result.latency, Duration::from_millis(42));
    }

    #[test]
    fn test_classify_non_2xx() {
        for code in [301, 404, 500, 503] {
            let result = classify("/stats", &exchange(Some(code), Ok("oops")));
            assert_eq!(result.status, ProbeStatus::Unhealthy);
            assert_eq!(result.detail, format!("HTTP {}", code));
        }
    }

    #[test]
    fn test_classify_transport_error() {
        let result = classify("/docs", &exchange(None, Err("connection failed: refused")));
        assert_eq!(result.status, ProbeStatus::Error);
        assert!(result.detail.contains("refused"));
    }

    #[test]
    fn test_method_serialization() {
        assert_eq!(serde_json::to_string(&HttpMethod::Post).unwrap(), "\"POST\"");
        let m: HttpMethod = serde_json::from_str("\"GET\"").unwrap();
        assert_eq!(m, HttpMethod::Get);
    }

    #[tokio::test]
    async fn test_connection_refused_is_error() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = EndpointProbe::new().unwrap();
        let request = ProbeRequest::get(format!("http://127.0.0.1:{}/health", port), Duration::from_secs(2));
        let result = probe.check("/health", &request).await;

        assert_eq!(result.status, ProbeStatus::Error);
    }
}
