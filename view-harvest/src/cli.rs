use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use view_harvest::config::ExecutionMode;

#[derive(Parser, Debug)]
#[command(name = "view-harvest", version, about = "Collect view counts of published collaboration videos")]
pub struct Args {
    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. `view_harvest=debug`.
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape a batch of videos and print the final session as JSON.
    Run {
        /// JSON file holding an array of video records.
        #[arg(short, long)]
        input: PathBuf,

        /// Project the report belongs to.
        #[arg(short, long)]
        project: String,

        /// Report date (defaults to today).
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Execution backend, overriding the configuration.
        #[arg(short, long)]
        mode: Option<ExecutionMode>,

        /// Retry failed tasks once after the first run.
        #[arg(long)]
        retry: bool,
    },
    /// Print the workflow rules resolved from the automation service.
    Workflows,
}
