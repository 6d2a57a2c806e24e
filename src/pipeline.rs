//! Lifecycle controller.
//!
//! Wires reference data, the generator, the distributor, the sinks and the
//! metrics aggregator together, runs generation in fixed-count or continuous
//! mode and drives the shutdown sequence:
//!
//! ```text
//! Idle → ConfigValidated → RefDataLoaded → SinksInitialized → Generating → Draining → Closed
//! ```
//!
//! Cancelling the token moves `Generating` to `Draining` right away: workers
//! stop, sink queues close, every sink flushes what it already accepted and is
//! closed. The final report is emitted once, after the last sink has closed.

use crate::config::Config;
use crate::distributor::Distributor;
use serde::Serialize;
use sink_csv::CsvSink;
use sink_kafka::{KafkaSink, KafkaSinkConfig};
use sink_parquet::ParquetSink;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use txn_core::{DataLoadError, ReferenceData, Sink, SinkError, SinkKind, TransactionStream};
use txn_generator::{GenerationError, RecordGenerator};
use txn_metrics::{FinalReport, MetricsAggregator, SinkCounters};

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    ConfigValidated,
    RefDataLoaded,
    SinksInitialized,
    Generating,
    Draining,
    Closed,
}

impl LifecycleState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, ConfigValidated)
                | (ConfigValidated, RefDataLoaded)
                | (RefDataLoaded, SinksInitialized)
                | (SinksInitialized, Generating)
                | (Generating, Draining)
                | (Draining, Closed)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Errors that stop the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Failed to load reference data: {0}")]
    DataLoad(#[from] DataLoadError),

    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize {sink} sink: {source}")]
    SinkInit {
        sink: SinkKind,
        #[source]
        source: SinkError,
    },

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// A transition outside the lifecycle order was attempted.
    #[error("Illegal lifecycle transition from {from} to {to}")]
    State {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// Outcome for one sink.
#[derive(Debug, Clone, Serialize)]
pub struct SinkSummary {
    pub kind: SinkKind,
    /// Records placed in the sink's queue.
    pub accepted: u64,
    /// Records the sink reports as persisted or delivered.
    pub written: u64,
    pub errors: u64,
    /// Why the write loop stopped early, if it did.
    pub write_error: Option<String>,
    pub close_error: Option<String>,
}

/// Result of a completed or cancelled run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_generated: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub sinks: Vec<SinkSummary>,
    pub report: FinalReport,
}

impl RunSummary {
    pub fn sink(&self, kind: SinkKind) -> Option<&SinkSummary> {
        self.sinks.iter().find(|s| s.kind == kind)
    }

    /// Sinks whose close operation failed.
    pub fn close_failures(&self) -> impl Iterator<Item = &SinkSummary> {
        self.sinks.iter().filter(|s| s.close_error.is_some())
    }
}

/// The producer pipeline for one run.
pub struct Pipeline {
    config: Config,
    state: LifecycleState,
}

impl Pipeline {
    /// Validate `config` and prepare a run.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let mut pipeline = Self {
            config,
            state: LifecycleState::Idle,
        };
        pipeline.transition(LifecycleState::ConfigValidated)?;
        Ok(pipeline)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn transition(&mut self, next: LifecycleState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::State {
                from: self.state,
                to: next,
            });
        }
        info!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        Ok(())
    }

    /// Run until generation completes or `cancel` fires.
    ///
    /// Startup failures (reference data, output directory, sink construction)
    /// return an error before any record is generated. Once generation has
    /// started, sink failures are isolated and reported in the summary.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary, PipelineError> {
        let reference = Arc::new(ReferenceData::load(&self.config.data.reference_paths())?);
        info!(
            currencies = reference.currencies().len(),
            currency_rates = reference.currency_rates().len(),
            agents = reference.agents().len(),
            game_categories = reference.game_categories().len(),
            "Reference data loaded"
        );
        self.transition(LifecycleState::RefDataLoaded)?;

        let kinds = self.config.active_sinks();
        let metrics = Arc::new(MetricsAggregator::new(
            self.config.metrics.interval(),
            self.config.metrics.detailed,
            &kinds,
        ));
        let sinks = self.build_sinks(&kinds, &metrics)?;
        self.transition(LifecycleState::SinksInitialized)?;

        let lanes = sinks
            .iter()
            .map(|(sink, counters)| (sink.kind(), Arc::clone(counters)))
            .collect();
        let (distributor, streams) =
            Distributor::new(self.config.producer.buffer_size, lanes, cancel.clone());

        let mut sink_tasks = JoinSet::new();
        for ((sink, _), stream) in sinks.into_iter().zip(streams) {
            sink_tasks.spawn(drive_sink(sink, Arc::clone(&metrics), stream));
        }

        let stop_reporting = CancellationToken::new();
        metrics.start_clock();
        let reporter = metrics.spawn_reporter(stop_reporting.clone());

        self.transition(LifecycleState::Generating)?;
        let generator = RecordGenerator::new(reference).with_metrics(Arc::clone(&metrics));
        let generated = if self.config.is_continuous() {
            info!(workers = 1, "Running in continuous mode until cancelled");
            generator
                .generate_continuous(distributor.clone(), cancel.clone())
                .await
        } else {
            generator
                .generate_batch(
                    self.config.producer.message_count,
                    self.config.producer.workers,
                    distributor.clone(),
                    cancel.clone(),
                )
                .await
        };
        distributor.close();

        let mut fatal = None;
        match generated {
            Ok(count) => info!(generated = count, "Generation finished"),
            Err(GenerationError::Cancelled { generated }) => {
                info!(generated, "Generation cancelled, draining sinks")
            }
            Err(GenerationError::OutputClosed { generated }) => {
                warn!(generated, "Every sink stopped accepting records")
            }
            Err(e) => {
                error!(error = %e, "Generation failed, draining sinks");
                fatal = Some(e);
            }
        }

        self.transition(LifecycleState::Draining)?;
        let mut outcomes = Vec::new();
        while let Some(joined) = sink_tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "Sink task failed"),
            }
        }

        stop_reporting.cancel();
        if let Err(e) = reporter.await {
            warn!(error = %e, "Metrics reporter task failed");
        }
        let report = metrics.report_final();
        self.transition(LifecycleState::Closed)?;

        if let Some(e) = fatal {
            return Err(e.into());
        }

        let mut sinks: Vec<SinkSummary> = kinds
            .iter()
            .map(|kind| {
                let counters = report.sink(*kind);
                let outcome = outcomes.iter().find(|o| o.kind == *kind);
                SinkSummary {
                    kind: *kind,
                    accepted: counters.map_or(0, |c| c.accepted),
                    written: outcome.map_or_else(|| counters.map_or(0, |c| c.written), |o| o.count),
                    errors: counters.map_or(0, |c| c.errors),
                    write_error: outcome.and_then(|o| o.write_error.clone()),
                    close_error: outcome
                        .map_or_else(|| Some("sink task failed".to_string()), |o| o.close_error.clone()),
                }
            })
            .collect();
        sinks.sort_by_key(|s| s.kind);

        Ok(RunSummary {
            total_generated: report.total_generated,
            elapsed: report.elapsed,
            cancelled: cancel.is_cancelled(),
            sinks,
            report,
        })
    }

    /// Construct every enabled sink, removing files created by earlier sinks
    /// if a later one fails.
    fn build_sinks(
        &self,
        kinds: &[SinkKind],
        metrics: &MetricsAggregator,
    ) -> Result<Vec<(Box<dyn Sink>, Arc<SinkCounters>)>, PipelineError> {
        let output = &self.config.output;
        if kinds.iter().any(|k| *k != SinkKind::Kafka) {
            std::fs::create_dir_all(&output.directory).map_err(|source| {
                PipelineError::OutputDirectory {
                    path: output.directory.clone(),
                    source,
                }
            })?;
        }

        let mut sinks: Vec<(Box<dyn Sink>, Arc<SinkCounters>)> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let counters = metrics.sink_counters(*kind).unwrap_or_default();
            match self.build_sink(*kind, Arc::clone(&counters)) {
                Ok(sink) => sinks.push((sink, counters)),
                Err(source) => {
                    remove_outputs(&sinks);
                    return Err(PipelineError::SinkInit {
                        sink: *kind,
                        source,
                    });
                }
            }
        }
        Ok(sinks)
    }

    fn build_sink(
        &self,
        kind: SinkKind,
        counters: Arc<SinkCounters>,
    ) -> Result<Box<dyn Sink>, SinkError> {
        let output = &self.config.output;
        let sink: Box<dyn Sink> = match kind {
            SinkKind::Csv => Box::new(CsvSink::create(
                output.directory.join(&output.csv.filename),
                output.csv.buffer_size,
                counters,
            )?),
            SinkKind::Parquet => Box::new(ParquetSink::create(
                output.directory.join(&output.parquet.filename),
                output.parquet.row_group_size,
                output.parquet.compression,
                counters,
            )?),
            SinkKind::Kafka => {
                let kafka = &self.config.kafka;
                let config = KafkaSinkConfig::new(kafka.brokers.clone(), kafka.topic.clone())
                    .with_compression(kafka.compression)
                    .with_batching(kafka.batch_size, kafka.flush_frequency())
                    .with_async_delivery(kafka.async_delivery);
                Box::new(KafkaSink::new(config, counters)?)
            }
        };
        Ok(sink)
    }
}

fn remove_outputs(sinks: &[(Box<dyn Sink>, Arc<SinkCounters>)]) {
    for (sink, _) in sinks {
        if let Some(path) = sink.output_path() {
            match std::fs::remove_file(path) {
                Ok(()) => info!(path = %path.display(), "Removed partial output"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
            }
        }
    }
}

struct SinkOutcome {
    kind: SinkKind,
    count: u64,
    write_error: Option<String>,
    close_error: Option<String>,
}

/// Write until the stream ends, then close. A failed write loop still closes.
async fn drive_sink(
    mut sink: Box<dyn Sink>,
    metrics: Arc<MetricsAggregator>,
    stream: TransactionStream,
) -> SinkOutcome {
    let kind = sink.kind();

    let write_error = match sink.write(stream).await {
        Ok(()) => None,
        Err(e) => {
            error!(sink = %kind, error = %e, "Sink write failed, stopping this sink");
            metrics.record_sink_error(kind, 1);
            Some(e.to_string())
        }
    };

    let close_error = match sink.close().await {
        Ok(()) => None,
        Err(e) => {
            error!(sink = %kind, error = %e, "Sink close failed");
            metrics.record_sink_error(kind, 1);
            Some(e.to_string())
        }
    };

    SinkOutcome {
        kind,
        count: sink.count(),
        write_error,
        close_error,
    }
}
