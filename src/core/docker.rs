/// Docker and Docker Compose integration
///
/// Asks the container runtime which of the expected containers are running. The runtime is
/// queried once per check; its raw listing is parsed for a running marker per name.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::Docker;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Observed state of one expected container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    NotRunning,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::NotRunning => "not_running",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub state: ContainerState,
    /// `running` / `not_running`, with a diagnostic appended when the runtime query failed
    pub detail: String,
}

/// Outcome of one status query against the runtime
#[derive(Debug, Clone)]
pub struct ContainerStatusReport {
    pub statuses: BTreeMap<String, ContainerStatus>,
    pub latency: Duration,
    /// Set when the runtime itself could not be queried
    pub diagnostic: Option<String>,
}

impl ContainerStatusReport {
    pub fn is_running(&self, name: &str) -> bool {
        self.statuses.get(name).map_or(false, |s| s.state.is_running())
    }
}

/// One external status query returning raw text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short name used in logs and diagnostics
    fn name(&self) -> String;

    /// Raw listing, one container per line
    async fn status_listing(&self) -> Result<String>;
}

/// `docker compose ps` in the project directory
#[derive(Debug, Clone)]
pub struct ComposeCli {
    project_dir: PathBuf,
    compose_file: Option<PathBuf>,
    timeout: Duration,
}

impl ComposeCli {
    pub fn new(project_dir: impl Into<PathBuf>, compose_file: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            project_dir: project_dir.into(),
            compose_file,
            timeout,
        }
    }
}

#[async_trait]
impl ContainerRuntime for ComposeCli {
    fn name(&self) -> String {
        "docker compose".to_string()
    }

    async fn status_listing(&self) -> Result<String> {
        let mut cmd = tokio::process::Command::new("docker");
        cmd.arg("compose");
        if let Some(file) = &self.compose_file {
            cmd.arg("-f").arg(file);
        }
        cmd.arg("ps")
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow!("docker compose ps timed out after {}s", self.timeout.as_secs()))?
            .context("Failed to execute docker compose ps")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "docker compose ps exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Docker Engine API, rendered as `name state` lines
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
    timeout: Duration,
}

impl DockerEngine {
    pub fn connect(timeout: Duration) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;
        Ok(Self { docker, timeout })
    }
}

#[async_trait]
impl ContainerRuntime for DockerEngine {
    fn name(&self) -> String {
        "docker engine".to_string()
    }

    async fn status_listing(&self) -> Result<String> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        });

        let containers = tokio::time::timeout(self.timeout, self.docker.list_containers(options))
            .await
            .map_err(|_| anyhow!("Docker API timed out after {}s", self.timeout.as_secs()))?
            .context("Failed to list containers")?;

        let mut lines = Vec::new();
        for summary in containers {
            let state = summary.state.unwrap_or_else(|| "unknown".to_string());
            for name in summary.names.unwrap_or_default() {
                lines.push(format!("{} {}", name.trim_start_matches('/'), state));
            }
        }

        Ok(lines.join("\n"))
    }
}

/// Stand-in for a runtime that could not be reached at startup; every query fails with
/// the original connect error
#[derive(Debug, Clone)]
pub struct UnreachableRuntime {
    name: String,
    error: String,
}

impl UnreachableRuntime {
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for UnreachableRuntime {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn status_listing(&self) -> Result<String> {
        Err(anyhow!("{}", self.error))
    }
}

/// `Up` or `running` as a whole word, any case
fn is_running_line(line: &str) -> bool {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"(?i)\b(up|running)\b").ok())
        .as_ref()
        .map_or(false, |marker| marker.is_match(line))
}

/// Map each expected name to running/not_running from a raw listing. A name matches a
/// line only as a whole whitespace-separated column.
pub fn parse_listing(listing: &str, expected: &[String]) -> BTreeMap<String, ContainerState> {
    let running_lines: Vec<&str> = listing
        .lines()
        .filter(|line| is_running_line(line))
        .collect();

    expected
        .iter()
        .map(|name| {
            let listed = running_lines
                .iter()
                .any(|line| line.split_whitespace().any(|column| column == name.as_str()));
            let state = if listed {
                ContainerState::Running
            } else {
                ContainerState::NotRunning
            };
            (name.clone(), state)
        })
        .collect()
}

pub struct ContainerStatusProbe {
    runtime: Box<dyn ContainerRuntime>,
}

impl ContainerStatusProbe {
    pub fn new(runtime: Box<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Query the runtime once. Failures mark every expected name `not_running`.
    pub async fn check(&self, expected: &[String]) -> ContainerStatusReport {
        let started = Instant::now();
        let listing = self.runtime.status_listing().await;
        let latency = started.elapsed();

        let failure = match &listing {
            Ok(text) if text.trim().is_empty() && !expected.is_empty() => {
                Some(format!("{} returned an empty listing", self.runtime.name()))
            }
            Ok(_) => None,
            Err(e) => Some(format!("{} query failed: {:#}", self.runtime.name(), e)),
        };

        if let Some(diagnostic) = failure {
            tracing::warn!(runtime = %self.runtime.name(), %diagnostic, "container status unavailable");
            let statuses = expected
                .iter()
                .map(|name| {
                    let status = ContainerStatus {
                        state: ContainerState::NotRunning,
                        detail: format!("not_running ({})", diagnostic),
                    };
                    (name.clone(), status)
                })
                .collect();
            return ContainerStatusReport {
                statuses,
                latency,
                diagnostic: Some(diagnostic),
            };
        }

        let text = listing.unwrap_or_default();
        let statuses = parse_listing(&text, expected)
            .into_iter()
            .map(|(name, state)| {
                tracing::debug!(container = %name, state = state.as_str(), "container status");
                let status = ContainerStatus {
                    state,
                    detail: state.as_str().to_string(),
                };
                (name, status)
            })
            .collect();

        ContainerStatusReport {
            statuses,
            latency,
            diagnostic: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSE_PS: &str = "\
NAME                IMAGE                      COMMAND                  SERVICE         CREATED        STATUS                    PORTS
elasticsearch       elasticsearch:8.11.0       \"/bin/tini -- /usr/l…\"   elasticsearch   2 hours ago    Up 2 hours (healthy)      0.0.0.0:9200->9200/tcp
pathway-pipeline    snapchef-pathway           \"python pipeline.py\"     pathway         2 hours ago    Exited (1) 5 minutes ago
redis               redis:7-alpine             \"docker-entrypoint.s…\"   redis           2 hours ago    Up 2 hours                0.0.0.0:6379->6379/tcp
snapchef-backend    snapchef-backend           \"uvicorn main:app --…\"   backend         2 hours ago    Up 2 hours                0.0.0.0:8000->8000/tcp
";

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_compose_listing() {
        let expected = names(&["snapchef-backend", "redis", "elasticsearch", "pathway-pipeline", "snapchef-frontend"]);
        let states = parse_listing(COMPOSE_PS, &expected);

        assert_eq!(states["snapchef-backend"], ContainerState::Running);
        assert_eq!(states["redis"], ContainerState::Running);
        assert_eq!(states["elasticsearch"], ContainerState::Running);
        assert_eq!(states["pathway-pipeline"], ContainerState::NotRunning);
        assert_eq!(states["snapchef-frontend"], ContainerState::NotRunning);
    }

    #[test]
    fn test_parse_engine_listing() {
        let listing = "redis running\nsnapchef-frontend exited\nsnapchef-backend Running";
        let states = parse_listing(listing, &names(&["redis", "snapchef-frontend", "snapchef-backend"]));

        assert!(states["redis"].is_running());
        assert!(!states["snapchef-frontend"].is_running());
        assert!(states["snapchef-backend"].is_running());
    }

    #[test]
    fn test_marker_is_whole_word() {
        let listing = "backup-runner exited\nsetup-job  Exited (0)";
        let states = parse_listing(listing, &names(&["backup-runner", "setup-job"]));
        assert!(!states["backup-runner"].is_running());
        assert!(!states["setup-job"].is_running());
    }

    #[test]
    fn test_name_must_match_whole_column() {
        let listing = "redis-commander     Up 2 hours\nredis               Exited (0) 3 minutes ago";
        let states = parse_listing(listing, &names(&["redis", "redis-commander", "commander"]));

        assert!(!states["redis"].is_running());
        assert!(states["redis-commander"].is_running());
        assert!(!states["commander"].is_running());
    }

    #[tokio::test]
    async fn test_unreachable_engine_marks_all_not_running() {
        let runtime = UnreachableRuntime::new(
            "docker engine",
            "Failed to connect to Docker daemon. Is Docker running?",
        );

        let containers = ContainerStatusProbe::new(Box::new(runtime));
        let report = containers.check(&names(&["snapchef-backend", "redis"])).await;

        let diagnostic = report.diagnostic.as_deref().unwrap();
        assert!(diagnostic.starts_with("docker engine query failed"));
        for name in ["snapchef-backend", "redis"] {
            let status = &report.statuses[name];
            assert_eq!(status.state, ContainerState::NotRunning);
            assert!(status.detail.contains("Is Docker running?"));
        }
    }

    #[tokio::test]
    async fn test_runtime_failure_marks_all_not_running() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_name().return_const("docker compose".to_string());
        runtime
            .expect_status_listing()
            .times(1)
            .returning(|| Err(anyhow!("Cannot connect to the Docker daemon")));

        let probe = ContainerStatusProbe::new(Box::new(runtime));
        let report = probe.check(&names(&["A", "B"])).await;

        assert!(report.diagnostic.is_some());
        for name in ["A", "B"] {
            let status = &report.statuses[name];
            assert_eq!(status.state, ContainerState::NotRunning);
            assert!(status.detail.starts_with("not_running ("));
            assert!(status.detail.contains("Cannot connect"));
        }
    }

    #[tokio::test]
    async fn test_empty_listing_is_a_failure() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_name().return_const("docker compose".to_string());
        runtime.expect_status_listing().returning(|| Ok(String::new()));

        let probe = ContainerStatusProbe::new(Box::new(runtime));
        let report = probe.check(&names(&["A"])).await;

        assert!(!report.is_running("A"));
        assert!(report.diagnostic.unwrap().contains("empty listing"));
    }

    #[tokio::test]
    async fn test_queries_runtime_once() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_name().return_const("docker compose".to_string());
        runtime
            .expect_status_listing()
            .times(1)
            .returning(|| Ok("A  Up 3 minutes\nB  Exited (137)".to_string()));

        let probe = ContainerStatusProbe::new(Box::new(runtime));
        let report = probe.check(&names(&["A", "B"])).await;

        assert!(report.is_running("A"));
        assert!(!report.is_running("B"));
        assert_eq!(report.statuses["A"].detail, "running");
        assert_eq!(report.statuses["B"].detail, "not_running");
    }
}
