/// Staged verification run
///
/// Drives the state machine from INIT to FINALIZE (or ABORTED), classifies every failure
/// and folds all results into one report. Container absence is the only fatal failure;
/// everything else is recorded and the run carries on so the report is complete.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::EnvironmentValidator;
use crate::core::docker::ContainerStatusProbe;
use crate::core::plan::{RunSettings, VerificationPlan};
use crate::core::probe::{classify, HttpProbe, ProbeRequest};
use crate::core::report::{
    ProbeResult, ProbeStatus, ReportBuilder, Section, Severity, VerificationReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    EnvCheck,
    ContainerCheck,
    WarmupWait,
    ServiceCheck,
    EndpointCheck,
    FunctionalCheck,
    Finalize,
    Aborted,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Finalize | Stage::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "INIT",
            Stage::EnvCheck => "ENV_CHECK",
            Stage::ContainerCheck => "CONTAINER_CHECK",
            Stage::WarmupWait => "WARMUP_WAIT",
            Stage::ServiceCheck => "SERVICE_CHECK",
            Stage::EndpointCheck => "ENDPOINT_CHECK",
            Stage::FunctionalCheck => "FUNCTIONAL_CHECK",
            Stage::Finalize => "FINALIZE",
            Stage::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives progress as the run executes
pub trait ProgressObserver: Send + Sync {
    fn stage_entered(&self, _stage: Stage) {}

    fn warmup_started(&self, _duration: Duration) {}

    fn result(&self, _section: Section, _result: &ProbeResult, _severity: Option<Severity>) {}

    fn warning(&self, _message: &str) {}
}

/// Observer that ignores everything
pub struct Silent;

impl ProgressObserver for Silent {}

/// Severity of a result; `None` when it needs no attention
pub fn severity_of(section: Section, status: ProbeStatus, required: bool) -> Option<Severity> {
    match status {
        ProbeStatus::Healthy | ProbeStatus::NotApplicable => None,
        _ if !required => Some(Severity::Warning),
        _ if section == Section::Containers => Some(Severity::Fatal),
        _ => Some(Severity::Degraded),
    }
}

pub struct Orchestrator {
    plan: VerificationPlan,
    settings: RunSettings,
    environment: EnvironmentValidator,
    containers: ContainerStatusProbe,
    http: Arc<dyn HttpProbe>,
    observer: Arc<dyn ProgressObserver>,
}

impl Orchestrator {
    pub fn new(
        plan: VerificationPlan,
        settings: RunSettings,
        environment: EnvironmentValidator,
        containers: ContainerStatusProbe,
        http: Arc<dyn HttpProbe>,
    ) -> Self {
        Self {
            plan,
            settings,
            environment,
            containers,
            http,
            observer: Arc::new(Silent),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Execute one full run and return the finalized report
    pub async fn run(&self) -> VerificationReport {
        let started = Instant::now();
        let mut builder = ReportBuilder::new(Utc::now());

        let terminal = match tokio::time::timeout(self.settings.deadline, self.drive(&mut builder)).await {
            Ok(stage) => stage,
            Err(_) => {
                let message = format!(
                    "run deadline of {} exceeded; required targets not yet probed are recorded as unknown",
                    humantime::format_duration(self.settings.deadline)
                );
                self.observer.warning(&message);
                builder.warn(message);
                self.enter(Stage::Finalize);
                Stage::Finalize
            }
        };

        let report = match terminal {
            Stage::Aborted => builder.abort(),
            _ => builder.finalize(&self.plan.expectations()),
        };

        tracing::info!(
            status = %report.overall_status,
            services = report.services.len(),
            endpoints = report.endpoints.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "verification finished"
        );

        report
    }

    fn enter(&self, stage: Stage) {
        tracing::info!(stage = stage.as_str(), "entering stage");
        self.observer.stage_entered(stage);
    }

    async fn drive(&self, builder: &mut ReportBuilder) -> Stage {
        let mut stage = Stage::Init;
        loop {
            self.enter(stage);
            if stage.is_terminal() {
                return stage;
            }
            stage = match stage {
                Stage::Init => Stage::EnvCheck,
                Stage::EnvCheck => {
                    self.check_environment(builder);
                    Stage::ContainerCheck
                }
                Stage::ContainerCheck => {
                    if self.check_containers(builder).await {
                        Stage::WarmupWait
                    } else {
                        Stage::Aborted
                    }
                }
                Stage::WarmupWait => {
                    self.wait_for_warmup().await;
                    Stage::ServiceCheck
                }
                Stage::ServiceCheck => {
                    self.check_services(builder).await;
                    Stage::EndpointCheck
                }
                Stage::EndpointCheck => {
                    self.check_endpoints(builder).await;
                    Stage::FunctionalCheck
                }
                Stage::FunctionalCheck => {
                    self.check_functional(builder).await;
                    Stage::Finalize
                }
                Stage::Finalize | Stage::Aborted => stage,
            };
        }
    }

    fn check_environment(&self, builder: &mut ReportBuilder) {
        let check = self.environment.validate();
        tracing::info!(source = %self.environment.source(), ok = check.ok, failures = check.failures.len(), "environment checked");

        for failure in &check.failures {
            let message = format!("environment: {}", failure);
            self.observer.warning(&message);
            builder.warn(message);
        }
    }

    /// False when a required container is not running
    async fn check_containers(&self, builder: &mut ReportBuilder) -> bool {
        let names = self.plan.container_names();
        if names.is_empty() {
            return true;
        }

        let timestamp = Utc::now();
        let observed = self.containers.check(&names).await;
        let mut fatal = Vec::new();

        for spec in &self.plan.containers {
            let Some(status) = observed.statuses.get(&spec.name) else {
                continue;
            };
            let probe_status = if status.state.is_running() {
                ProbeStatus::Healthy
            } else {
                ProbeStatus::Unhealthy
            };
            let result = ProbeResult::new(&spec.name, probe_status, observed.latency, &status.detail, timestamp);

            if self.record(builder, Section::Containers, &spec.name, result, spec.required) == Some(Severity::Fatal) {
                fatal.push(spec.name.clone());
            }
        }

        if fatal.is_empty() {
            true
        } else {
            tracing::error!(containers = ?fatal, "required containers not running, aborting");
            false
        }
    }

    async fn wait_for_warmup(&self) {
        let warmup = self.settings.warmup;
        if warmup.is_zero() {
            return;
        }
        tracing::debug!(warmup_ms = warmup.as_millis() as u64, "waiting for services to initialize");
        self.observer.warmup_started(warmup);
        tokio::time::sleep(warmup).await;
    }

    async fn check_services(&self, builder: &mut ReportBuilder) {
        for spec in &self.plan.services {
            let url = spec.url.as_deref().unwrap_or_default();
            let result = if spec.speaks_http() {
                let request = ProbeRequest::get(url, self.settings.request_timeout);
                classify(&spec.name, &self.http.exchange(&request).await)
            } else {
                ProbeResult::not_applicable(&spec.name, format!("no HTTP health check for {}", url))
            };
            self.record(builder, Section::Services, &spec.name, result, spec.required);
        }
    }

    async fn check_endpoints(&self, builder: &mut ReportBuilder) {
        let timeout = self.settings.request_timeout;
        let http = &self.http;

        let mut pending = stream::iter(self.plan.endpoints.iter().enumerate())
            .map(|(index, spec)| async move {
                let exchange = http.exchange(&spec.request(timeout)).await;
                (index, classify(&spec.key, &exchange))
            })
            .buffer_unordered(self.settings.max_concurrency.max(1));

        // Record on completion so a deadline hit mid-stage keeps what already finished
        while let Some((index, result)) = pending.next().await {
            let spec = &self.plan.endpoints[index];
            self.record(builder, Section::Endpoints, &spec.key, result, spec.required);
        }
    }

    async fn check_functional(&self, builder: &mut ReportBuilder) {
        let Some(check) = &self.plan.functional else {
            return;
        };
        let exchange = self.http.exchange(&check.request()).await;
        let result = check.assess(&exchange);
        self.record(builder, Section::Functional, &check.name, result, true);
    }

    fn record(
        &self,
        builder: &mut ReportBuilder,
        section: Section,
        key: &str,
        result: ProbeResult,
        required: bool,
    ) -> Option<Severity> {
        let severity = severity_of(section, result.status, required);
        tracing::info!(
            section = ?section,
            target = key,
            status = result.status.as_str(),
            latency_ms = result.latency.as_millis() as u64,
            detail = %result.detail,
            "probe result"
        );
        self.observer.result(section, &result, severity);

        if severity == Some(Severity::Warning) {
            builder.warn(format!("{} is {} ({}), not required", key, result.status, result.detail));
        }

        match section {
            Section::Containers | Section::Services => {
                builder.record_service(key, result, required);
            }
            Section::Endpoints => {
                builder.record_endpoint(key, result, required);
            }
            Section::Functional => {
                builder.record_functional(result);
            }
        }

        severity
    }
}
