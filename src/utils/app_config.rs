/// Verification plan configuration
/// Loaded from stackcheck.toml / stackcheck.yaml, ~/.config/stackcheck/config.toml,
/// or the built-in stack definition

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::config::EnvRequirements;
use crate::core::functional::{Check, FieldAssertion, FunctionalCheck};
use crate::core::plan::{EndpointSpec, RunSettings, ServiceSpec, VerificationPlan};
use crate::core::probe::HttpMethod;
use crate::utils::constants::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("invalid TOML in {path}: {source}")]
    Toml { path: PathBuf, source: toml::de::Error },

    #[error("invalid YAML in {path}: {source}")]
    Yaml { path: PathBuf, source: serde_yaml::Error },

    #[error("invalid URL for '{target}': {url} ({reason})")]
    InvalidUrl { target: String, url: String, reason: String },

    #[error("endpoint '{endpoint}' refers to unknown HTTP service '{service}'")]
    UnknownService { endpoint: String, service: String },

    #[error("target name '{0}' is declared more than once")]
    DuplicateTarget(String),

    #[error("{0}")]
    Invalid(String),
}

mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| humantime::parse_duration(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    #[serde(with = "duration_str")]
    pub warmup: Duration,
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    #[serde(with = "duration_str")]
    pub deadline: Duration,
    pub max_concurrency: usize,
    pub report_path: PathBuf,
    pub health_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(DEFAULT_WARMUP_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            deadline: Duration::from_secs(DEFAULT_DEADLINE_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            health_path: PathBuf::from(DEFAULT_HEALTH_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// `docker compose ps`
    #[default]
    Compose,
    /// Docker Engine API
    Engine,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub kind: RuntimeKind,
    pub project_dir: PathBuf,
    pub compose_file: Option<PathBuf>,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::Compose,
            project_dir: PathBuf::from("."),
            compose_file: None,
            timeout: Duration::from_secs(DEFAULT_RUNTIME_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub env_file: PathBuf,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub placeholders: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            required: REQUIRED_ENV_KEYS.iter().map(|s| s.to_string()).collect(),
            optional: Vec::new(),
            placeholders: PLACEHOLDER_VALUES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub service: String,
    pub path: String,
    /// Report key; defaults to the path
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_functional_name() -> String {
    "functional_check".to_string()
}

fn default_post() -> HttpMethod {
    HttpMethod::Post
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionalConfig {
    #[serde(default = "default_functional_name")]
    pub name: String,
    pub service: String,
    pub path: String,
    #[serde(default = "default_post")]
    pub method: HttpMethod,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default, with = "duration_str::option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub expect: Vec<FieldAssertion>,
}

/// Everything a run needs, as written by the operator
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
    pub run: RunConfig,
    pub runtime: RuntimeConfig,
    pub environment: EnvironmentConfig,
    pub containers: Vec<ContainerConfig>,
    pub services: Vec<ServiceConfig>,
    pub endpoints: Vec<EndpointConfig>,
    pub functional: Option<FunctionalConfig>,
}

impl VerifyConfig {
    /// The built-in recipe-search stack
    pub fn builtin() -> Self {
        let stack = get_services();

        let containers = stack
            .iter()
            .map(|s| ContainerConfig {
                name: s.container_name.to_string(),
                required: s.critical,
            })
            .collect();

        let services = stack
            .iter()
            .filter_map(|s| {
                s.url.map(|url| ServiceConfig {
                    name: s.name.to_string(),
                    url: url.to_string(),
                    required: s.critical,
                })
            })
            .collect();

        let endpoints = DEFAULT_ENDPOINTS
            .iter()
            .map(|path| EndpointConfig {
                service: BACKEND_SERVICE.to_string(),
                path: path.to_string(),
                name: None,
                method: HttpMethod::Get,
                body: None,
                required: true,
            })
            .collect();

        let functional = FunctionalConfig {
            name: "recipe_search".to_string(),
            service: BACKEND_SERVICE.to_string(),
            path: "/search".to_string(),
            method: HttpMethod::Post,
            payload: Some(json!({"dish_name": "biryani", "filters": null})),
            timeout: Some(Duration::from_secs(DEFAULT_FUNCTIONAL_TIMEOUT_SECS)),
            expect: vec![FieldAssertion::new("total_found", Check::NonZero)],
        };

        Self {
            containers,
            services,
            endpoints,
            functional: Some(functional),
            ..Self::default()
        }
    }

    /// Load a plan file; `.yaml`/`.yml` are YAML, anything else TOML
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        } else {
            toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Explicit path, then the working directory, then the user config dir, then built-in
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let mut candidates: Vec<PathBuf> = CONFIG_FILE_NAMES.iter().map(PathBuf::from).collect();
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("stackcheck").join("config.toml"));
        }

        for candidate in candidates {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "using plan file");
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }

        tracing::debug!("no plan file found, using built-in stack definition");
        Ok((Self::builtin(), None))
    }

    pub fn settings(&self) -> Result<RunSettings, ConfigError> {
        if self.run.max_concurrency == 0 {
            return Err(ConfigError::Invalid("run.max_concurrency must be at least 1".to_string()));
        }
        if self.run.deadline.is_zero() {
            return Err(ConfigError::Invalid("run.deadline must be greater than zero".to_string()));
        }

        Ok(RunSettings {
            warmup: self.run.warmup,
            request_timeout: self.run.request_timeout,
            deadline: self.run.deadline,
            max_concurrency: self.run.max_concurrency,
        })
    }

    /// Resolve names and URLs into an immutable plan
    pub fn plan(&self) -> Result<VerificationPlan, ConfigError> {
        let mut seen = HashSet::new();
        let mut claim = |name: &str| {
            if seen.insert(name.to_string()) {
                Ok(())
            } else {
                Err(ConfigError::DuplicateTarget(name.to_string()))
            }
        };

        let mut containers = Vec::new();
        for c in &self.containers {
            claim(&c.name)?;
            containers.push(ServiceSpec::container(&c.name, c.required));
        }

        let mut services = Vec::new();
        for s in &self.services {
            claim(&s.name)?;
            reqwest::Url::parse(&s.url).map_err(|e| ConfigError::InvalidUrl {
                target: s.name.clone(),
                url: s.url.clone(),
                reason: e.to_string(),
            })?;
            services.push(ServiceSpec::http(&s.name, &s.url, s.required));
        }

        let mut endpoint_keys = HashSet::new();
        let mut endpoints = Vec::new();
        for e in &self.endpoints {
            let key = e.name.clone().unwrap_or_else(|| e.path.clone());
            if !endpoint_keys.insert(key.clone()) {
                return Err(ConfigError::DuplicateTarget(key));
            }
            let url = resolve(&services, &e.service, &e.path, &key)?;
            endpoints.push(EndpointSpec {
                key,
                service: e.service.clone(),
                url,
                method: e.method,
                body: e.body.clone(),
                required: e.required,
            });
        }

        let functional = match &self.functional {
            Some(f) => {
                for assertion in &f.expect {
                    assertion.validate().map_err(ConfigError::Invalid)?;
                }
                Some(FunctionalCheck {
                    name: f.name.clone(),
                    url: resolve(&services, &f.service, &f.path, &f.name)?,
                    method: f.method,
                    payload: f.payload.clone(),
                    timeout: f
                        .timeout
                        .unwrap_or(Duration::from_secs(DEFAULT_FUNCTIONAL_TIMEOUT_SECS)),
                    expect: f.expect.clone(),
                })
            }
            None => None,
        };

        Ok(VerificationPlan {
            containers,
            services,
            endpoints,
            functional,
            environment: EnvRequirements {
                required: self.environment.required.clone(),
                optional: self.environment.optional.clone(),
                placeholders: self.environment.placeholders.clone(),
            },
        })
    }
}

/// Join `path` onto the base URL of an HTTP service
fn resolve(services: &[ServiceSpec], service: &str, path: &str, target: &str) -> Result<String, ConfigError> {
    let base = services
        .iter()
        .find(|s| s.name == service && s.speaks_http())
        .and_then(|s| s.url.as_deref())
        .ok_or_else(|| ConfigError::UnknownService {
            endpoint: target.to_string(),
            service: service.to_string(),
        })?;

    let invalid = |reason: String| ConfigError::InvalidUrl {
        target: target.to_string(),
        url: format!("{}{}", base, path),
        reason,
    };

    let base = reqwest::Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    let joined = base.join(path).map_err(|e| invalid(e.to_string()))?;
    Ok(joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    const PLAN_TOML: &str = r#"
[run]
warmup = "0s"
request_timeout = "3s"
deadline = "1m"
max_concurrency = 2
report_path = "out/report.json"

[environment]
required = ["API_KEY"]
placeholders = ["changeme"]

[[containers]]
name = "api"

[[containers]]
name = "worker"
required = false

[[services]]
name = "backend"
url = "http://localhost:8000"

[[services]]
name = "cache"
url = "redis://localhost:6379"

[[endpoints]]
service = "backend"
path = "/health"

[[endpoints]]
service = "backend"
path = "/search"
name = "search-post"
method = "POST"
body = { q = "dal" }
required = false

[functional]
service = "backend"
path = "/search"
payload = { dish_name = "paneer" }
timeout = "20s"
expect = [{ field = "total_found", check = "at_least", value = 2 }]
"#;

    fn write_plan(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_toml_plan() {
        let file = write_plan(".toml", PLAN_TOML);
        let config = VerifyConfig::load(file.path()).unwrap();

        let settings = config.settings().unwrap();
        assert_eq!(settings.warmup, Duration::ZERO);
        assert_eq!(settings.request_timeout, Duration::from_secs(3));
        assert_eq!(settings.deadline, Duration::from_secs(60));
        assert_eq!(config.run.report_path, PathBuf::from("out/report.json"));
        assert_eq!(config.runtime.kind, RuntimeKind::Compose);

        let plan = config.plan().unwrap();
        assert_eq!(plan.container_names(), vec!["api", "worker"]);
        assert!(!plan.containers[1].required);
        assert_eq!(plan.endpoints[0].url, "http://localhost:8000/health");
        assert_eq!(plan.endpoints[1].key, "search-post");
        assert_eq!(plan.endpoints[1].method, HttpMethod::Post);
        assert_eq!(plan.endpoints[1].body, Some(json!({"q": "dal"})));

        let functional = plan.functional.unwrap();
        assert_eq!(functional.name, "functional_check");
        assert_eq!(functional.method, HttpMethod::Post);
        assert_eq!(functional.timeout, Duration::from_secs(20));
        assert_eq!(functional.url, "http://localhost:8000/search");
        assert_eq!(plan.environment.required, vec!["API_KEY"]);
    }

    #[test]
    fn test_load_yaml_plan() {
        let yaml = r#"
run:
  warmup: 5s
containers:
  - name: api
services:
  - name: backend
    url: http://localhost:8000
endpoints:
  - service: backend
    path: /stats
"#;
        let file = write_plan(".yaml", yaml);
        let config = VerifyConfig::load(file.path()).unwrap();

        assert_eq!(config.run.warmup, Duration::from_secs(5));
        let plan = config.plan().unwrap();
        assert_eq!(plan.endpoints[0].url, "http://localhost:8000/stats");
        assert!(plan.functional.is_none());
    }

    #[test]
    fn test_builtin_plan_resolves() {
        let plan = VerifyConfig::builtin().plan().unwrap();

        assert_eq!(plan.containers.len(), 5);
        assert_eq!(plan.services.len(), 4);
        assert_eq!(plan.endpoints.len(), 4);
        assert!(plan.services.iter().any(|s| s.name == "cache" && !s.speaks_http()));
        assert_eq!(plan.functional.unwrap().url, "http://localhost:8000/search");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = VerifyConfig::builtin();
        config.services.push(ServiceConfig {
            name: "redis".into(),
            url: "http://localhost:6380".into(),
            required: true,
        });
        assert!(matches!(config.plan(), Err(ConfigError::DuplicateTarget(name)) if name == "redis"));
    }

    #[test]
    fn test_unknown_service_rejected() {
        let mut config = VerifyConfig::builtin();
        config.endpoints[0].service = "nope".into();
        assert!(matches!(config.plan(), Err(ConfigError::UnknownService { .. })));

        // the cache has no HTTP base URL to join onto
        let mut config = VerifyConfig::builtin();
        config.endpoints[0].service = "cache".into();
        assert!(matches!(config.plan(), Err(ConfigError::UnknownService { .. })));
    }

    #[test]
    fn test_bad_values_rejected() {
        let file = write_plan(".toml", "[run]\nwarmup = \"soon\"\n");
        assert!(matches!(VerifyConfig::load(file.path()), Err(ConfigError::Toml { .. })));

        let file = write_plan(".toml", "[run]\nwarmpu = \"1s\"\n");
        assert!(VerifyConfig::load(file.path()).is_err());

        let mut config = VerifyConfig::builtin();
        config.run.max_concurrency = 0;
        assert!(config.settings().is_err());

        let mut config = VerifyConfig::builtin();
        config.services[0].url = "not a url".into();
        assert!(matches!(config.plan(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_discover_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            VerifyConfig::discover(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }
}
