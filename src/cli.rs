use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Field-operations task manager: store audits, submissions, review and reporting.
/// Storage is one JSON file; see `--db` and `--config` for where it lives.
#[derive(Parser)]
#[command(name = "cf", version, about = "Store task, submission and review CLI")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true, env = "CONNECTFLOW_DB")]
    pub db: Option<PathBuf>,

    /// Path to the TOML config file.
    #[arg(long, global = true, env = "CONNECTFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}
