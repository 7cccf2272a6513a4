/// Built-in stack definition and defaults
///
/// Used when no plan file is found: the recipe-search deployment with its frontend,
/// API backend, cache, search index and data pipeline.

/// Service definition
#[derive(Debug, Clone)]
pub struct StackService {
    pub name: &'static str,
    pub container_name: &'static str,
    /// Health URL; `None` for services only checked at container level
    pub url: Option<&'static str>,
    pub critical: bool,
}

pub const BACKEND_SERVICE: &str = "backend";

/// Backend API endpoints checked after the services respond
pub const DEFAULT_ENDPOINTS: &[&str] = &["/health", "/docs", "/recipes/popular", "/stats"];

pub const DEFAULT_REPORT_PATH: &str = "verification_results.json";
pub const DEFAULT_HEALTH_PATH: &str = "health_status.json";
pub const DEFAULT_ENV_FILE: &str = ".env";

pub const DEFAULT_WARMUP_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FUNCTIONAL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RUNTIME_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_DEADLINE_SECS: u64 = 300;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Plan file names looked up in the working directory, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["stackcheck.toml", "stackcheck.yaml", "stackcheck.yml"];

/// Secrets the backend cannot work without
pub const REQUIRED_ENV_KEYS: &[&str] = &["HUGGINGFACE_API_KEY"];

/// Template values shipped in .env.example that mean "not configured"
pub const PLACEHOLDER_VALUES: &[&str] = &[
    "your_huggingface_api_key_here",
    "your_api_key_here",
    "changeme",
    "replace_me",
];

pub fn get_services() -> Vec<StackService> {
    vec![
        StackService {
            name: "frontend",
            container_name: "snapchef-frontend",
            url: Some("http://localhost:3000"),
            critical: true,
        },
        StackService {
            name: BACKEND_SERVICE,
            container_name: "snapchef-backend",
            url: Some("http://localhost:8000"),
            critical: true,
        },
        StackService {
            name: "cache",
            container_name: "redis",
            // No HTTP protocol; reported not_applicable
            url: Some("redis://localhost:6379"),
            critical: true,
        },
        StackService {
            name: "search",
            container_name: "elasticsearch",
            url: Some("http://localhost:9200/_cluster/health"),
            critical: true,
        },
        StackService {
            name: "pipeline",
            container_name: "pathway-pipeline",
            url: None,
            critical: true,
        },
    ]
}
