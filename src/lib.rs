//! txn-producer library.
//!
//! Generates synthetic settlement transactions at high rates and writes the
//! same stream to every enabled sink (CSV, Parquet, Kafka) while reporting
//! throughput.
//!
//! # Architecture
//!
//! ```text
//!  ReferenceData ──▶ RecordGenerator (W workers)
//!                            │ submit()
//!                            ▼
//!                       Distributor
//!                 ┌──────────┼──────────┐
//!                 ▼          ▼          ▼
//!             [queue]    [queue]    [queue]      one bounded queue per sink
//!                 │          │          │
//!              CsvSink  ParquetSink  KafkaSink
//!                 └──────────┼──────────┘
//!                            ▼
//!                    MetricsAggregator
//! ```
//!
//! [`Pipeline`] owns the lifecycle; the binary only loads [`Config`], installs
//! logging and signal handling, and calls [`Pipeline::run`].

pub mod config;
pub mod distributor;
pub mod pipeline;
pub mod shutdown;

pub use config::{Config, ConfigError, OutputFormat};
pub use distributor::Distributor;
pub use pipeline::{LifecycleState, Pipeline, PipelineError, RunSummary, SinkSummary};
