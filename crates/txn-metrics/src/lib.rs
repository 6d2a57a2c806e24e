//! Throughput and error metrics for the txn-producer pipeline.
//!
//! The [`MetricsAggregator`] owns one atomic counter for generated records
//! and a [`SinkCounters`] block per active sink. Generator workers, the
//! distributor and the sinks update those counters directly; the aggregator
//! only reads them when reporting, so reporting never blocks the pipeline.
//!
//! ```text
//!  generator ──record_generated──┐
//!  distributor ──accepted────────┤
//!  sinks ──written / errors──────┤
//!                                ▼
//!                      MetricsAggregator
//!                       │            │
//!           report_periodic()   report_final()
//!            (every interval)    (exactly once)
//! ```

pub mod aggregator;
pub mod report;

pub use aggregator::{MetricsAggregator, SinkCounters};
pub use report::{format_duration, format_rate, Assessment, FinalReport, PeriodicReport, SinkReport};
