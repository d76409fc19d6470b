//! reprodesk: automated issue triage and reproduction

use anyhow::{Context, Result};
use clap::Parser;

use reprodesk::cli::{commands, Cli};
use reprodesk::config::AppConfig;
use reprodesk::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(Some(cli.config.as_path()))
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_logging(&config.logging)?;

    commands::run(cli, config).await
}
