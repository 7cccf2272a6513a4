/// Quick health snapshot of the declared HTTP services
///
/// One GET per service, no staging and no container check. Targets without an HTTP
/// protocol (the cache) are reported `not_applicable`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::plan::ServiceSpec;
use crate::core::probe::{classify, HttpProbe, ProbeRequest};
use crate::core::report::ProbeResult;

pub struct HealthChecker {
    http: Arc<dyn HttpProbe>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(http: Arc<dyn HttpProbe>, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Probe every service concurrently
    pub async fn check_all(&self, services: &[ServiceSpec]) -> BTreeMap<String, ProbeResult> {
        let probes = services.iter().map(|spec| async move {
            let result = match spec.url.as_deref() {
                Some(url) if spec.speaks_http() => {
                    let request = ProbeRequest::get(url, self.timeout);
                    classify(&spec.name, &self.http.exchange(&request).await)
                }
                Some(url) => ProbeResult::not_applicable(&spec.name, format!("no HTTP health check for {}", url)),
                None => ProbeResult::not_applicable(&spec.name, "no URL declared"),
            };
            (spec.name.clone(), result)
        });

        futures::future::join_all(probes).await.into_iter().collect()
    }
}

/// True when every required service is healthy or has no applicable check
pub fn required_healthy(services: &[ServiceSpec], results: &BTreeMap<String, ProbeResult>) -> bool {
    use crate::core::report::ProbeStatus;

    services.iter().filter(|s| s.required).all(|s| {
        results
            .get(&s.name)
            .map_or(false, |r| matches!(r.status, ProbeStatus::Healthy | ProbeStatus::NotApplicable))
    })
}
