#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stackcheck::core::config::{EnvRequirements, EnvironmentValidator};
use stackcheck::core::ContainerRuntime;

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{}", addr)
}

/// Request counters shared with the fake backend
#[derive(Default, Clone)]
pub struct Hits {
    pub health: Arc<AtomicUsize>,
    pub search: Arc<AtomicUsize>,
}

impl Hits {
    pub fn health(&self) -> usize {
        self.health.load(Ordering::SeqCst)
    }

    pub fn search(&self) -> usize {
        self.search.load(Ordering::SeqCst)
    }
}

/// Backend with the recipe API surface; `/stats` answers with `stats_status`
pub fn backend(stats_status: StatusCode, total_found: u64, hits: Hits) -> Router {
    let health_hits = hits.health.clone();
    let search_hits = hits.search.clone();

    Router::new()
        .route(
            "/health",
            get(move || {
                health_hits.fetch_add(1, Ordering::SeqCst);
                async { Json(json!({"status": "healthy"})) }
            }),
        )
        .route("/docs", get(|| async { "<html>docs</html>" }))
        .route("/recipes/popular", get(|| async { Json(json!({"recipes": []})) }))
        .route("/stats", get(move || async move { (stats_status, "stats") }))
        .route(
            "/search",
            post(move |Json(body): Json<Value>| {
                search_hits.fetch_add(1, Ordering::SeqCst);
                async move {
                    let dish = body.get("dish_name").cloned().unwrap_or(Value::Null);
                    Json(json!({"query": dish, "total_found": total_found, "results": []}))
                }
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .route("/echo", post(|Json(body): Json<Value>| async move { Json(body) }))
}

/// Plan file for a stack whose backend lives at `base`
pub fn plan_toml(base: &str) -> String {
    format!(
        r#"
[run]
warmup = "0s"
request_timeout = "2s"
deadline = "30s"
max_concurrency = 2

[environment]
required = ["HUGGINGFACE_API_KEY"]
placeholders = ["your_huggingface_api_key_here"]

[[containers]]
name = "snapchef-backend"

[[containers]]
name = "redis"

[[services]]
name = "backend"
url = "{base}"

[[services]]
name = "cache"
url = "redis://localhost:6379"

[[endpoints]]
service = "backend"
path = "/health"

[[endpoints]]
service = "backend"
path = "/docs"

[[endpoints]]
service = "backend"
path = "/recipes/popular"

[[endpoints]]
service = "backend"
path = "/stats"

[functional]
name = "recipe_search"
service = "backend"
path = "/search"
payload = {{ dish_name = "biryani" }}
timeout = "5s"
expect = [{{ field = "total_found", check = "non_zero" }}]
"#
    )
}

/// Runtime returning a canned `docker compose ps` listing
pub struct FixedRuntime(pub &'static str);

#[async_trait]
impl ContainerRuntime for FixedRuntime {
    fn name(&self) -> String {
        "fixed".to_string()
    }

    async fn status_listing(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub const BOTH_UP: &str = "\
NAME               IMAGE            COMMAND    SERVICE    CREATED    STATUS
snapchef-backend   snapchef-api     \"uvicorn\"  backend    1m ago     Up 1 minute
redis              redis:7          \"redis\"    redis      1m ago     Up 1 minute
";

pub const BACKEND_ONLY: &str = "\
NAME               IMAGE            COMMAND    SERVICE    CREATED    STATUS
snapchef-backend   snapchef-api     \"uvicorn\"  backend    1m ago     Up 1 minute
";

pub fn configured_env(requirements: EnvRequirements) -> EnvironmentValidator {
    let values: HashMap<String, String> =
        HashMap::from([("HUGGINGFACE_API_KEY".to_string(), "hf_live_token".to_string())]);
    EnvironmentValidator::new(Box::new(values), requirements)
}
