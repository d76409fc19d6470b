//! Subcommand implementations

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use reprodesk_core::OriginRef;

use super::runtime::Runtime;
use super::{Cli, Command};
use crate::config::AppConfig;
use crate::harness::{EventBus, Simulator};
use crate::intake::InboundReport;
use crate::llm::OllamaClient;
use crate::reporter::ConsoleReporter;

pub const REPORT_FILE: &str = "simulation-report.md";

pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Command::Simulate {
            dir,
            report,
            offline,
        } => simulate(&config, dir, report, offline).await,
        Command::Investigate {
            text,
            file,
            user,
            offline,
        } => investigate(&config, text, file, user, offline).await,
        Command::Ping => ping(&config).await,
        Command::Issues => issues(&config).await,
    }
}

async fn simulate(
    config: &AppConfig,
    dir: Option<PathBuf>,
    report_path: Option<PathBuf>,
    offline: bool,
) -> Result<()> {
    let runtime = Runtime::build(config, offline)?;
    let examples_dir = dir.unwrap_or_else(|| config.harness.examples_dir.clone());
    let simulator = Simulator::new(
        Arc::new(runtime.intake()),
        Arc::new(EventBus::new()),
        &examples_dir,
    );

    let report = simulator
        .run_all()
        .await
        .with_context(|| format!("failed to run examples in {}", examples_dir.display()))?;

    let report_path =
        report_path.unwrap_or_else(|| config.harness.report_dir.join(REPORT_FILE));
    std::fs::write(&report_path, report.render_markdown())
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    println!(
        "{} examples: {} succeeded, {} failed. Report written to {}",
        report.total(),
        report.successes(),
        report.failures(),
        report_path.display()
    );
    Ok(())
}

async fn investigate(
    config: &AppConfig,
    text: Option<String>,
    file: Option<PathBuf>,
    user: String,
    offline: bool,
) -> Result<()> {
    let content = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => bail!("either --text or --file is required"),
    };
    if content.trim().is_empty() {
        bail!("report is empty");
    }

    let runtime = Runtime::build(config, offline)?;
    let intake = runtime.intake();
    let reporter = ConsoleReporter::new();

    let report = InboundReport {
        user_id: user.clone(),
        username: user,
        content,
        origin: OriginRef {
            message_id: "cli".to_string(),
            channel_id: "console".to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        },
    };
    let Some(outward) = intake.receive(report, &reporter).await? else {
        bail!("a report from this user is already in flight");
    };
    let outcome = intake.begin(&outward, &reporter).await?;

    info!(issue_id = outcome.issue_id, status = %outcome.final_status, "Done");
    println!();
    println!("Issue #{}: {}", outcome.issue_id, outcome.final_status);
    if let Some(url) = &outcome.archive_url {
        println!("Archive: {url}");
    }
    if let Some(error) = &outcome.error {
        println!("Error: {error}");
    }
    Ok(())
}

async fn ping(config: &AppConfig) -> Result<()> {
    let client = OllamaClient::new(&config.llm)?;
    let version = client
        .ping()
        .await
        .with_context(|| format!("model server at {} is unreachable", client.base_url()))?;
    println!(
        "Connected to {} (version {version}), model {}",
        client.base_url(),
        client.model()
    );
    Ok(())
}

async fn issues(config: &AppConfig) -> Result<()> {
    let runtime = Runtime::build(config, false)?;
    let active = runtime.store.list_active_issues().await?;
    if active.is_empty() {
        println!("No active issues");
        return Ok(());
    }
    for issue in active {
        let first_line = issue.report.lines().next().unwrap_or_default();
        println!(
            "#{:<5} {:<12} {:<16} {}",
            issue.id,
            issue.status.as_str(),
            issue.username,
            first_line
        );
    }
    Ok(())
}
