//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Failover Bench - drive replicas with failover, then analyze recovery
#[derive(Parser, Debug)]
#[command(name = "failover-bench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "FAILOVER_BENCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "FAILOVER_BENCH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "FAILOVER_BENCH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate load against the replicas and export the outcome records
    Run(RunArgs),

    /// Analyze an exported metrics file
    Analyze(AnalyzeArgs),
}

/// Options of `run`; each overrides the configuration file
#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Replica base URL (repeatable)
    #[arg(short, long = "replica")]
    pub replicas: Vec<String>,

    /// Requests per second
    #[arg(long)]
    pub rate: Option<f64>,

    /// Run length in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Concurrent workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Output directory for the metrics files
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Options of `analyze`
#[derive(clap::Args, Debug)]
pub struct AnalyzeArgs {
    /// Metrics file (CSV or JSON, by extension)
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Failure injection time (ms since epoch)
    #[arg(long)]
    pub failure_time: Option<f64>,

    /// Recovery time (ms since epoch)
    #[arg(long)]
    pub recovery_time: Option<f64>,

    /// Window size in ms
    #[arg(long)]
    pub window_size: Option<f64>,

    /// Do not detect failure periods from latency spikes
    #[arg(long)]
    pub no_auto_detect: bool,

    /// Output directory for the report and window series
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
