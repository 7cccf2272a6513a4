/// Console rendering
///
/// Live progress while a run executes and the summary printed afterwards. Everything here
/// writes to stdout; diagnostics stay with `tracing` on stderr.

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::config::EnvCheck;
use crate::core::docker::ContainerStatusReport;
use crate::core::orchestrator::{ProgressObserver, Stage};
use crate::core::plan::{RunSettings, VerificationPlan};
use crate::core::report::{OverallStatus, ProbeResult, ProbeStatus, Section, Severity, VerificationReport};
use crate::utils::helpers::{format_duration, truncate_string};

const DETAIL_WIDTH: usize = 60;

pub fn status_marker(status: ProbeStatus) -> ColoredString {
    match status {
        ProbeStatus::Healthy => "✓".green(),
        ProbeStatus::NotApplicable => "-".dimmed(),
        ProbeStatus::Unhealthy => "✗".red(),
        ProbeStatus::Error => "✗".red().bold(),
        ProbeStatus::Unknown => "?".yellow(),
    }
}

fn verdict(status: OverallStatus) -> ColoredString {
    match status {
        OverallStatus::Success => "SUCCESS".green().bold(),
        OverallStatus::Failed => "FAILED".red().bold(),
        OverallStatus::Aborted => "ABORTED".red().bold(),
    }
}

fn stage_heading(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::EnvCheck => Some("Environment"),
        Stage::ContainerCheck => Some("Containers"),
        Stage::ServiceCheck => Some("Services"),
        Stage::EndpointCheck => Some("API endpoints"),
        Stage::FunctionalCheck => Some("Functional check"),
        _ => None,
    }
}

fn result_line(result: &ProbeResult) -> String {
    format!(
        "  {} {:<24} {:<15} {}",
        status_marker(result.status),
        result.target,
        result.status.as_str(),
        truncate_string(&result.detail, DETAIL_WIDTH).dimmed()
    )
}

/// Prints each stage and result as it happens
#[derive(Default)]
pub struct ConsoleObserver {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }
}

impl ProgressObserver for ConsoleObserver {
    fn stage_entered(&self, stage: Stage) {
        self.finish_spinner();
        if let Some(heading) = stage_heading(stage) {
            println!("\n{}", heading.bold());
        }
    }

    fn warmup_started(&self, duration: Duration) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} ({elapsed})") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Waiting {} for services to initialize", format_duration(duration)));
        spinner.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(spinner);
        }
    }

    fn result(&self, _section: Section, result: &ProbeResult, severity: Option<Severity>) {
        let suffix = match severity {
            Some(Severity::Warning) => " (optional)".yellow().to_string(),
            Some(Severity::Fatal) => " (fatal)".red().to_string(),
            _ => String::new(),
        };
        println!("{}{}", result_line(result), suffix);
    }

    fn warning(&self, message: &str) {
        println!("  {} {}", "!".yellow().bold(), message.yellow());
    }
}

/// Final summary after a run
pub fn print_summary(report: &VerificationReport, saved_to: Option<&std::path::Path>) {
    let total = report.results().count();
    let healthy = report
        .results()
        .filter(|r| matches!(r.status, ProbeStatus::Healthy | ProbeStatus::NotApplicable))
        .count();

    println!("\n{}", "=".repeat(60));
    println!("Verification {}  ({}/{} checks passed)", verdict(report.overall_status), healthy, total);

    let failing: Vec<&ProbeResult> = report
        .results()
        .filter(|r| !matches!(r.status, ProbeStatus::Healthy | ProbeStatus::NotApplicable))
        .collect();
    if !failing.is_empty() {
        println!("\nNeeds attention:");
        for result in failing {
            println!("{}", result_line(result));
        }
    }

    if !report.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &report.warnings {
            println!("  {} {}", "!".yellow().bold(), warning);
        }
    }

    match saved_to {
        Some(path) => println!("\nResults saved to {}", path.display()),
        None => println!("\nResults were not saved"),
    }

    if report.overall_status == OverallStatus::Aborted {
        println!("Start the missing containers (docker compose up -d) and run again.");
    }
}

/// Quick health snapshot table
pub fn print_health(results: &BTreeMap<String, ProbeResult>) {
    println!("{}", "Service health".bold());
    for result in results.values() {
        println!("{}", result_line(result));
    }
}

pub fn print_environment(source: &str, check: &EnvCheck) {
    println!("{} {}", "Environment from".bold(), source);
    if check.failures.is_empty() {
        println!("  {} all required variables configured", "✓".green());
        return;
    }
    for failure in &check.failures {
        let marker = if failure.required { "✗".red() } else { "!".yellow() };
        println!("  {} {}", marker, failure);
    }
}

pub fn print_containers(report: &ContainerStatusReport) {
    println!("{}", "Containers".bold());
    for (name, status) in &report.statuses {
        let marker = if status.state.is_running() { "✓".green() } else { "✗".red() };
        println!("  {} {:<24} {}", marker, name, status.detail);
    }
    if let Some(diagnostic) = &report.diagnostic {
        println!("  {} {}", "!".yellow().bold(), diagnostic.yellow());
    }
}

/// Resolved plan, for `stackcheck plan`
pub fn print_plan(plan: &VerificationPlan, settings: &RunSettings, source: Option<&std::path::Path>) {
    match source {
        Some(path) => println!("{} {}", "Plan from".bold(), path.display()),
        None => println!("{}", "Built-in plan".bold()),
    }
    println!(
        "  warmup {}, request timeout {}, deadline {}, concurrency {}",
        format_duration(settings.warmup),
        format_duration(settings.request_timeout),
        format_duration(settings.deadline),
        settings.max_concurrency
    );

    let flag = |required: bool| if required { "" } else { " (optional)" };

    println!("\nContainers");
    for c in &plan.containers {
        println!("  {}{}", c.name, flag(c.required));
    }
    println!("\nServices");
    for s in &plan.services {
        println!("  {:<12} {}{}", s.name, s.url.as_deref().unwrap_or("-"), flag(s.required));
    }
    println!("\nEndpoints");
    for e in &plan.endpoints {
        println!("  {:<20} {} {}{}", e.key, e.method, e.url, flag(e.required));
    }
    if let Some(f) = &plan.functional {
        println!("\nFunctional check");
        println!("  {} {} {}", f.name, f.method, f.url);
        for assertion in &f.expect {
            println!("    expect {}", assertion);
        }
    }
    if !plan.environment.required.is_empty() {
        println!("\nRequired environment: {}", plan.environment.required.join(", "));
    }
}
