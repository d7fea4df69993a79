//! Failover Bench - failover load generator and fault-tolerance analyzer

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use failover_bench::{
    cli::{AnalyzeArgs, Cli, Command, RunArgs},
    config::Config,
    dispatch::{Dispatcher, HttpBackend, LoadGenerator, WorkItem},
    metrics::MetricsStore,
    report::{AnalysisOptions, run_analysis},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Run(args) => run_load(config, args).await,
        Command::Analyze(args) => run_analyze(config, args),
    }
}

/// Drive load against the replicas, then export what was collected
async fn run_load(mut config: Config, args: RunArgs) -> ExitCode {
    // Apply CLI overrides
    if !args.replicas.is_empty() {
        config.dispatch.replicas = args.replicas;
    }
    if let Some(rate) = args.rate {
        config.dispatch.rate_per_second = rate;
    }
    if let Some(secs) = args.duration {
        config.dispatch.duration = Duration::from_secs(secs);
    }
    if let Some(workers) = args.workers {
        config.dispatch.workers = workers;
    }
    if let Some(dir) = args.output {
        config.output.directory = dir;
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let d = &config.dispatch;
    let backend = match HttpBackend::new(d.attempt_timeout) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!("Failed to create backend client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let store = Arc::new(MetricsStore::new());
    let dispatcher = match Dispatcher::new(
        d.replicas.clone(),
        backend,
        Arc::clone(&store),
        d.attempt_timeout,
    ) {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(e) => {
            error!("Failed to create dispatcher: {e}");
            return ExitCode::FAILURE;
        }
    };
    let work = WorkItem {
        input_path: d.work.input_path.clone(),
        threshold: d.work.threshold,
    };
    let load = match LoadGenerator::new(
        Arc::clone(&dispatcher),
        work,
        d.rate_per_second,
        d.duration,
        d.workers,
    ) {
        Ok(load) => load,
        Err(e) => {
            error!("Invalid load parameters: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        replicas = d.replicas.len(),
        "Starting Failover Bench"
    );

    // Ctrl-C stops the run; collected records are still exported.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping load");
            on_signal.cancel();
        }
    });

    let result = load.run(cancel).await;
    let exported = export(&config, &store);

    match (result, exported) {
        (Ok(summary), Ok(())) => {
            let stats = dispatcher.stats().snapshot();
            println!(
                "Dispatched {} requests in {:.1}s ({:.2} req/s), {} failovers, {} exhausted",
                summary.requests,
                summary.elapsed_secs,
                summary.achieved_rate,
                stats.failovers,
                stats.exhausted
            );
            ExitCode::SUCCESS
        }
        (Err(e), _) => {
            error!("Load run failed: {e}");
            ExitCode::FAILURE
        }
        (_, Err(e)) => {
            error!("Failed to export metrics: {e}");
            ExitCode::FAILURE
        }
    }
}

fn export(config: &Config, store: &MetricsStore) -> failover_bench::Result<()> {
    fs::create_dir_all(&config.output.directory)?;
    store.export_file(&config.output.metrics_path("csv"))?;
    store.export_file(&config.output.metrics_path("json"))?;
    store.export_events_file(&config.output.events_path())?;
    Ok(())
}

/// Analyze a metrics file and write the report
fn run_analyze(config: Config, args: AnalyzeArgs) -> ExitCode {
    let store = MetricsStore::new();
    if let Err(e) = store.load_file(&args.input) {
        error!("Failed to load {}: {e}", args.input.display());
        return ExitCode::FAILURE;
    }

    let mut analysis = config.analysis;
    if let Some(window) = args.window_size {
        analysis.window_size_ms = window;
    }
    if args.no_auto_detect {
        analysis.auto_detect = false;
    }

    let options = AnalysisOptions {
        analysis,
        failure_time_ms: args.failure_time,
        recovery_time_ms: args.recovery_time,
        output_dir: Some(args.output.unwrap_or(config.output.directory)),
    };

    match run_analysis(&store, &options, None) {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Analysis failed: {e}");
            ExitCode::FAILURE
        }
    }
}
