mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cli::{Cli, Commands, GlobalArgs, VerifyArgs};
use stackcheck::console::{self, ConsoleObserver};
use stackcheck::core::config::{EnvRequirements, EnvSource};
use stackcheck::core::store::{exit_code, write_json_atomic};
use stackcheck::core::{
    ComposeCli, ContainerRuntime, ContainerStatusProbe, DockerEngine, DotEnvFile, EndpointProbe,
    EnvironmentValidator, HealthChecker, LayeredEnv, Orchestrator, ProcessEnv, ResultStore,
    UnreachableRuntime,
};
use stackcheck::logging;
use stackcheck::utils::{is_sensitive_key, mask_sensitive, RuntimeKind, VerifyConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.global.verbose, cli.global.log_format) {
        eprintln!("{:#}", e);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let (config, source) = VerifyConfig::discover(cli.global.config.as_deref())?;
    let global = cli.global;

    match cli.command.unwrap_or_else(|| Commands::Verify(VerifyArgs::default())) {
        Commands::Verify(args) => handle_verify(config, &global, args).await,
        Commands::Health { strict, output } => handle_health(config, strict, output).await,
        Commands::Env => handle_env(&config, &global),
        Commands::Containers => handle_containers(config, &global).await,
        Commands::Show { output, json } => handle_show(&config, output, json),
        Commands::Plan => {
            let plan = config.plan()?;
            let settings = config.settings()?;
            console::print_plan(&plan, &settings, source.as_deref());
            Ok(0)
        }
    }
}

async fn handle_verify(mut config: VerifyConfig, global: &GlobalArgs, args: VerifyArgs) -> Result<i32> {
    if let Some(warmup) = args.warmup {
        config.run.warmup = warmup;
    }
    if let Some(deadline) = args.deadline {
        config.run.deadline = deadline;
    }
    if let Some(concurrency) = args.concurrency {
        config.run.max_concurrency = usize::from(concurrency);
    }
    let report_path = args.output.unwrap_or_else(|| config.run.report_path.clone());

    let plan = config.plan()?;
    let settings = config.settings()?;

    let store = ResultStore::new(&report_path);
    let lock = store
        .lock()
        .context("Another verification run appears to be in progress")?;
    tracing::debug!(lock = %lock.path().display(), "holding run lock");

    let environment = EnvironmentValidator::new(env_source(&config, global), plan.environment.clone());
    let containers = ContainerStatusProbe::new(container_runtime(&config, global));
    let http = Arc::new(EndpointProbe::new()?);

    let mut orchestrator = Orchestrator::new(plan, settings, environment, containers, http);
    if !args.json {
        println!("Verifying deployment (report: {})", report_path.display());
        orchestrator = orchestrator.with_observer(Arc::new(ConsoleObserver::new()));
    }

    let report = tokio::select! {
        report = orchestrator.run() => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, no report written");
            eprintln!("Interrupted; verification incomplete, previous report left untouched");
            return Ok(1);
        }
    };
    let save_warning = store.persist_or_warn(&report);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        if let Some(warning) = &save_warning {
            eprintln!("{}", warning);
        }
    } else {
        if let Some(warning) = &save_warning {
            println!("{}", warning);
        }
        let saved = save_warning.is_none().then(|| store.path());
        console::print_summary(&report, saved);
    }

    Ok(exit_code(report.overall_status))
}

async fn handle_health(config: VerifyConfig, strict: bool, output: Option<PathBuf>) -> Result<i32> {
    let plan = config.plan()?;
    let http = Arc::new(EndpointProbe::new()?);
    let checker = HealthChecker::new(http, config.run.request_timeout);

    let results = checker.check_all(&plan.services).await;
    console::print_health(&results);

    let path = output.unwrap_or_else(|| config.run.health_path.clone());
    match write_json_atomic(&path, &results) {
        Ok(()) => println!("\nHealth status saved to {}", path.display()),
        Err(e) => println!("\nWarning: could not save health status: {}", e),
    }

    let healthy = stackcheck::core::health::required_healthy(&plan.services, &results);
    Ok(if strict && !healthy { 1 } else { 0 })
}

fn handle_env(config: &VerifyConfig, global: &GlobalArgs) -> Result<i32> {
    let plan = config.plan()?;
    let source = env_source(config, global);
    print_env_values(source.as_ref(), &plan.environment);

    let validator = EnvironmentValidator::new(source, plan.environment);
    let check = validator.validate();
    console::print_environment(&validator.source(), &check);

    Ok(if check.ok { 0 } else { 1 })
}

async fn handle_containers(config: VerifyConfig, global: &GlobalArgs) -> Result<i32> {
    let plan = config.plan()?;
    let probe = ContainerStatusProbe::new(container_runtime(&config, global));
    let report = probe.check(&plan.container_names()).await;
    console::print_containers(&report);

    let all_up = plan
        .containers
        .iter()
        .filter(|c| c.required)
        .all(|c| report.is_running(&c.name));
    Ok(if all_up { 0 } else { 1 })
}

fn handle_show(config: &VerifyConfig, output: Option<PathBuf>, json: bool) -> Result<i32> {
    let path = output.unwrap_or_else(|| config.run.report_path.clone());
    let report = ResultStore::new(&path).load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Report from {} ({})", path.display(), report.run_timestamp.to_rfc3339());
        for result in report.results() {
            println!(
                "  {} {:<24} {}",
                console::status_marker(result.status),
                result.target,
                result.detail
            );
        }
        console::print_summary(&report, Some(path.as_path()));
    }

    Ok(exit_code(report.overall_status))
}

/// .env file layered over the process environment; a missing file only logs a warning
fn env_source(config: &VerifyConfig, global: &GlobalArgs) -> Box<dyn EnvSource> {
    let path = global
        .env_file
        .clone()
        .unwrap_or_else(|| config.environment.env_file.clone());

    let layered = match load_env_file(&path) {
        Some(file) => LayeredEnv::new().with(file).with(ProcessEnv),
        None => LayeredEnv::new().with(ProcessEnv),
    };
    Box::new(layered)
}

fn load_env_file(path: &Path) -> Option<DotEnvFile> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "env file not found, using process environment only");
        return None;
    }
    match DotEnvFile::load(path) {
        Ok(file) => {
            tracing::debug!(path = %file.path().display(), keys = file.len(), "loaded env file");
            Some(file)
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "env file unreadable, using process environment only");
            None
        }
    }
}

/// An Engine connect failure becomes a runtime whose every query fails, so the run still
/// reaches the container stage and records a report.
fn container_runtime(config: &VerifyConfig, global: &GlobalArgs) -> Box<dyn ContainerRuntime> {
    let runtime = &config.runtime;
    match global.runtime.unwrap_or(runtime.kind) {
        RuntimeKind::Compose => Box::new(ComposeCli::new(
            &runtime.project_dir,
            runtime.compose_file.clone(),
            runtime.timeout,
        )),
        RuntimeKind::Engine => match DockerEngine::connect(runtime.timeout) {
            Ok(engine) => Box::new(engine),
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::warn!(error = %error, "docker engine unreachable");
                Box::new(UnreachableRuntime::new("docker engine", error))
            }
        },
    }
}

fn print_env_values(source: &dyn EnvSource, requirements: &EnvRequirements) {
    let keys = requirements.required.iter().chain(requirements.optional.iter());
    for key in keys {
        let shown = match source.get(key) {
            Some(value) if is_sensitive_key(key) => mask_sensitive(&value, 3),
            Some(value) => value,
            None => "(not set)".to_string(),
        };
        println!("  {:<28} {}", key, shown);
    }
}
