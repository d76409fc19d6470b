//! Command-line interface
//!
//! - `simulate`: replay example reports and write a markdown report
//! - `investigate`: run one report through the pipeline on the console
//! - `ping`: check the model server
//! - `issues`: list issues still being worked on

pub mod commands;
pub mod runtime;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "reprodesk", version, about = "Automated issue triage and reproduction")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = "reprodesk.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every example report through the pipeline
    Simulate {
        /// Directory of *.json / *.md example reports
        dir: Option<PathBuf>,

        /// Where to write the markdown report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Use an in-memory store, blob store and the scripted model
        #[arg(long)]
        offline: bool,
    },

    /// Investigate a single report
    Investigate {
        /// Report text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// File holding the report text
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long, default_value = "cli-user")]
        user: String,

        #[arg(long)]
        offline: bool,
    },

    /// Check connectivity to the model server
    Ping,

    /// List issues that have not reached a terminal status
    Issues,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "reprodesk",
            "simulate",
            "demos",
            "--report",
            "out.md",
            "--offline",
        ])
        .unwrap();
        match cli.command {
            Command::Simulate {
                dir,
                report,
                offline,
            } => {
                assert_eq!(dir, Some(PathBuf::from("demos")));
                assert_eq!(report, Some(PathBuf::from("out.md")));
                assert!(offline);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("reprodesk.toml"));
    }

    #[test]
    fn test_investigate_needs_input() {
        assert!(Cli::try_parse_from(["reprodesk", "investigate"]).is_err());
        assert!(Cli::try_parse_from([
            "reprodesk",
            "--config",
            "x.toml",
            "investigate",
            "--text",
            "crash on save"
        ])
        .is_ok());
    }
}
