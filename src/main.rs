//! Command-line interface for txn-producer
//!
//! # Usage Examples
//!
//! ```bash
//! # Run with config.yaml from the working directory
//! txn-producer
//!
//! # Explicit config file and debug logging
//! txn-producer --config /etc/txn-producer/config.yaml --log-level debug
//!
//! # Override settings through the environment
//! PRODUCER_MESSAGE_COUNT=1000000 OUTPUT_FORMAT=both txn-producer
//! ```
//!
//! `message_count: 0` runs until Ctrl+C or SIGTERM; everything accepted so far
//! is flushed before the process exits.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use txn_producer::{shutdown, Config, Pipeline};

#[derive(Parser)]
#[command(name = "txn-producer")]
#[command(about = "Generate synthetic transactions into CSV, Parquet and Kafka sinks")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "TXN_PRODUCER_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("Invalid log level: {}", cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting txn-producer");

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    tracing::info!(
        message_count = config.producer.message_count,
        workers = config.producer.workers,
        output_format = %config.output.format,
        kafka_enabled = config.kafka.enabled,
        continuous_mode = config.is_continuous(),
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();
    let signals = shutdown::spawn_signal_handler(cancel.clone());

    let pipeline = Pipeline::new(config)?;
    let result = pipeline.run(cancel.clone()).await;

    // Stop the signal handler if the run ended on its own.
    cancel.cancel();
    if let Err(e) = signals.await {
        tracing::warn!(error = %e, "Signal handler task failed");
    }

    let summary = result.context("Producer pipeline failed")?;
    for sink in summary.close_failures() {
        tracing::warn!(
            sink = %sink.kind,
            error = sink.close_error.as_deref().unwrap_or_default(),
            "Sink did not close cleanly"
        );
    }
    tracing::info!(
        total_generated = summary.total_generated,
        cancelled = summary.cancelled,
        sink_errors = summary.report.total_errors(),
        "Producer finished"
    );
    Ok(())
}
