/// Verification data model
///
/// Probe results, the per-run report and the builder that assembles it stage by stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
    Error,
    NotApplicable,
    Unknown,
}

impl ProbeStatus {
    pub fn is_healthy(self) -> bool {
        self == ProbeStatus::Healthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeStatus::Healthy => "healthy",
            ProbeStatus::Unhealthy => "unhealthy",
            ProbeStatus::Error => "error",
            ProbeStatus::NotApplicable => "not_applicable",
            ProbeStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Failed,
    Aborted,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Failed => "failed",
            OverallStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much a failed check matters to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Non-required check failed; recorded only
    Warning,
    /// Required service, endpoint or functional check failed; verdict becomes `failed`
    Degraded,
    /// Required container missing; run aborts
    Fatal,
}

/// Report section a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Containers,
    Services,
    Endpoints,
    Functional,
}

/// Result of one probe invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: String,
    pub status: ProbeStatus,
    #[serde(rename = "latency_ms", with = "millis")]
    pub latency: Duration,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// Latency is truncated to whole milliseconds so the persisted record matches memory
    pub fn new(
        target: impl Into<String>,
        status: ProbeStatus,
        latency: Duration,
        detail: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            target: target.into(),
            status,
            latency: Duration::from_millis(latency.as_millis() as u64),
            detail: detail.into(),
            timestamp,
        }
    }

    /// Result for a target that has no probe protocol
    pub fn not_applicable(target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(target, ProbeStatus::NotApplicable, Duration::ZERO, detail, Utc::now())
    }

    /// Result for a target that never got probed
    pub fn unknown(target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(target, ProbeStatus::Unknown, Duration::ZERO, detail, Utc::now())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Finalized outcome of one verification run
///
/// `warnings` accompanies the report for the console summary and is not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, ProbeResult>,
    pub endpoints: BTreeMap<String, ProbeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functional_check: Option<ProbeResult>,
    pub overall_status: OverallStatus,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl VerificationReport {
    /// All results in report order (services, endpoints, functional check)
    pub fn results(&self) -> impl Iterator<Item = &ProbeResult> {
        self.services
            .values()
            .chain(self.endpoints.values())
            .chain(self.functional_check.iter())
    }
}

/// Required targets a finalized report must account for
#[derive(Debug, Clone, Default)]
pub struct Expectations {
    pub services: Vec<String>,
    pub endpoints: Vec<String>,
    pub functional: Option<String>,
}

/// Accumulates results across stages; entries are only ever added
#[derive(Debug)]
pub struct ReportBuilder {
    run_timestamp: DateTime<Utc>,
    services: BTreeMap<String, ProbeResult>,
    endpoints: BTreeMap<String, ProbeResult>,
    functional_check: Option<ProbeResult>,
    required_services: BTreeSet<String>,
    required_endpoints: BTreeSet<String>,
    warnings: Vec<String>,
}

impl ReportBuilder {
    pub fn new(run_timestamp: DateTime<Utc>) -> Self {
        Self {
            run_timestamp,
            services: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            functional_check: None,
            required_services: BTreeSet::new(),
            required_endpoints: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a container or service result. Returns false if the key was already taken.
    pub fn record_service(&mut self, key: &str, result: ProbeResult, required: bool) -> bool {
        Self::insert(&mut self.services, &mut self.required_services, key, result, required)
    }

    /// Record an endpoint result. Returns false if the key was already taken.
    pub fn record_endpoint(&mut self, key: &str, result: ProbeResult, required: bool) -> bool {
        Self::insert(&mut self.endpoints, &mut self.required_endpoints, key, result, required)
    }

    /// Record the functional check. Returns false if one was already recorded.
    pub fn record_functional(&mut self, result: ProbeResult) -> bool {
        if self.functional_check.is_some() {
            tracing::warn!(target = %result.target, "functional check already recorded, keeping first result");
            return false;
        }
        self.functional_check = Some(result);
        true
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(warning = %message, "warning recorded");
        self.warnings.push(message);
    }

    pub fn has_service(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    pub fn has_endpoint(&self, key: &str) -> bool {
        self.endpoints.contains_key(key)
    }

    fn insert(
        map: &mut BTreeMap<String, ProbeResult>,
        required_set: &mut BTreeSet<String>,
        key: &str,
        result: ProbeResult,
        required: bool,
    ) -> bool {
        if map.contains_key(key) {
            tracing::warn!(key, "result already recorded, keeping first result");
            return false;
        }
        if required {
            required_set.insert(key.to_string());
        }
        map.insert(key.to_string(), result);
        true
    }

    /// Close the run after a fatal container failure
    pub fn abort(self) -> VerificationReport {
        self.build(OverallStatus::Aborted)
    }

    /// Close the run, recording `unknown` for required targets that never produced a result
    pub fn finalize(mut self, expected: &Expectations) -> VerificationReport {
        for key in &expected.services {
            if !self.has_service(key) {
                self.record_service(key, ProbeResult::unknown(key, "not probed"), true);
            }
        }
        for key in &expected.endpoints {
            if !self.has_endpoint(key) {
                self.record_endpoint(key, ProbeResult::unknown(key, "not probed"), true);
            }
        }
        if let Some(name) = &expected.functional {
            if self.functional_check.is_none() {
                self.functional_check = Some(ProbeResult::unknown(name, "not probed"));
            }
        }

        let status = self.verdict();
        self.build(status)
    }

    fn verdict(&self) -> OverallStatus {
        let required_ok = |map: &BTreeMap<String, ProbeResult>, required: &BTreeSet<String>| {
            required.iter().all(|key| {
                map.get(key).map_or(false, |r| {
                    matches!(r.status, ProbeStatus::Healthy | ProbeStatus::NotApplicable)
                })
            })
        };

        let functional_ok = self
            .functional_check
            .as_ref()
            .map_or(true, |r| r.status.is_healthy());

        if required_ok(&self.services, &self.required_services)
            && required_ok(&self.endpoints, &self.required_endpoints)
            && functional_ok
        {
            OverallStatus::Success
        } else {
            OverallStatus::Failed
        }
    }

    fn build(self, overall_status: OverallStatus) -> VerificationReport {
        VerificationReport {
            run_timestamp: self.run_timestamp,
            services: self.services,
            endpoints: self.endpoints,
            functional_check: self.functional_check,
            overall_status,
            warnings: self.warnings,
        }
    }
}
