//! Counter aggregation and periodic reporting.

use crate::report::{
    format_duration, format_rate, rate, Assessment, FinalReport, PeriodicReport, SinkReport,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use txn_core::SinkKind;

/// Counters for one active sink.
///
/// Shared between the distributor (accepted), the sink itself (written,
/// errors) and the aggregator (reads).
#[derive(Debug, Default)]
pub struct SinkCounters {
    accepted: AtomicU64,
    written: AtomicU64,
    errors: AtomicU64,
}

impl SinkCounters {
    pub fn add_accepted(&self, n: u64) {
        self.accepted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_written(&self, n: u64) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_errors(&self, n: u64) {
        self.errors.fetch_add(n, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Clock {
    started: Instant,
    last_report: Instant,
    last_generated: u64,
}

/// Aggregates generator and sink counters and reports throughput.
#[derive(Debug)]
pub struct MetricsAggregator {
    interval: Duration,
    detailed: bool,
    generated: AtomicU64,
    sinks: Vec<(SinkKind, Arc<SinkCounters>)>,
    clock: Mutex<Clock>,
    finalized: AtomicBool,
}

impl MetricsAggregator {
    /// Create an aggregator with counters for the given active sinks.
    ///
    /// # Arguments
    ///
    /// * `interval` - Period of the background reporter
    /// * `detailed` - Include the per-sink breakdown in periodic reports
    /// * `sinks` - Sinks enabled for this run
    pub fn new(interval: Duration, detailed: bool, sinks: &[SinkKind]) -> Self {
        let now = Instant::now();
        Self {
            interval,
            detailed,
            generated: AtomicU64::new(0),
            sinks: sinks
                .iter()
                .map(|kind| (*kind, Arc::new(SinkCounters::default())))
                .collect(),
            clock: Mutex::new(Clock {
                started: now,
                last_report: now,
                last_generated: 0,
            }),
            finalized: AtomicBool::new(false),
        }
    }

    /// Restart the wall clock, typically when generation begins.
    pub fn start_clock(&self) {
        let now = Instant::now();
        let mut clock = self.lock_clock();
        clock.started = now;
        clock.last_report = now;
        clock.last_generated = self.generated();
    }

    /// Counters for an active sink.
    pub fn sink_counters(&self, kind: SinkKind) -> Option<Arc<SinkCounters>> {
        self.sinks
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, counters)| Arc::clone(counters))
    }

    pub fn record_generated(&self, n: u64) {
        self.generated.fetch_add(n, Ordering::Relaxed);
    }

    /// Count records persisted by `kind` for callers that hold only the
    /// aggregator. Sinks update the shared handle from
    /// [`sink_counters`](Self::sink_counters) instead, which lands in the same
    /// counters without a lookup per batch.
    pub fn record_sink_written(&self, kind: SinkKind, n: u64) {
        if let Some(counters) = self.find(kind) {
            counters.add_written(n);
        }
    }

    /// Count failures observed outside a sink, such as a write loop or
    /// close that returned an error. Sinks count their own per-record
    /// outcomes through the handle from [`sink_counters`](Self::sink_counters).
    pub fn record_sink_error(&self, kind: SinkKind, n: u64) {
        if let Some(counters) = self.find(kind) {
            counters.add_errors(n);
        }
    }

    /// Total records generated so far.
    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.lock_clock().started.elapsed()
    }

    /// Emit and return an interval snapshot.
    pub fn report_periodic(&self) -> PeriodicReport {
        let now = Instant::now();
        let total = self.generated();

        let (elapsed, interval_elapsed, interval_count) = {
            let mut clock = self.lock_clock();
            let snapshot = (
                now.duration_since(clock.started),
                now.duration_since(clock.last_report),
                total.saturating_sub(clock.last_generated),
            );
            clock.last_report = now;
            clock.last_generated = total;
            snapshot
        };

        let report = PeriodicReport {
            elapsed,
            total_generated: total,
            overall_rate: rate(total, elapsed),
            interval_rate: rate(interval_count, interval_elapsed),
            sinks: self.sink_reports(),
        };

        info!(
            total_messages = report.total_generated,
            elapsed = %format_duration(report.elapsed),
            overall_rate = %format_rate(report.overall_rate),
            current_rate = %format_rate(report.interval_rate),
            "Performance metrics"
        );
        if self.detailed {
            for sink in &report.sinks {
                info!(
                    sink = %sink.kind,
                    accepted = sink.accepted,
                    written = sink.written,
                    errors = sink.errors,
                    "Writer metrics"
                );
            }
        }

        report
    }

    /// Emit and return the run summary.
    ///
    /// Logging happens only on the first call; later calls just return the
    /// current figures.
    pub fn report_final(&self) -> FinalReport {
        let elapsed = self.elapsed();
        let total = self.generated();
        let average_rate = rate(total, elapsed);
        let report = FinalReport {
            total_generated: total,
            elapsed,
            average_rate,
            assessment: Assessment::from_rate(average_rate),
            sinks: self.sink_reports(),
        };

        if self.finalized.swap(true, Ordering::SeqCst) {
            return report;
        }

        info!(
            total_messages = report.total_generated,
            total_time = %format_duration(report.elapsed),
            average_throughput = %format_rate(report.average_rate),
            "Final summary"
        );
        for sink in &report.sinks {
            info!(
                sink = %sink.kind,
                accepted = sink.accepted,
                written = sink.written,
                errors = sink.errors,
                "Output breakdown"
            );
            if sink.written < sink.accepted && sink.kind != SinkKind::Kafka {
                warn!(
                    sink = %sink.kind,
                    missing = sink.accepted - sink.written,
                    "Sink persisted fewer records than it accepted"
                );
            }
        }
        info!(
            result = report.assessment.description(),
            rate_msg_per_sec = report.average_rate as u64,
            "Performance assessment"
        );

        report
    }

    /// Run [`report_periodic`](Self::report_periodic) every interval until
    /// `stop` is cancelled.
    pub fn spawn_reporter(self: &Arc<Self>, stop: CancellationToken) -> JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + metrics.interval;
            let mut ticker = tokio::time::interval_at(start, metrics.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        metrics.report_periodic();
                    }
                }
            }
        })
    }

    fn sink_reports(&self) -> Vec<SinkReport> {
        self.sinks
            .iter()
            .map(|(kind, counters)| SinkReport {
                kind: *kind,
                accepted: counters.accepted(),
                written: counters.written(),
                errors: counters.errors(),
            })
            .collect()
    }

    fn find(&self, kind: SinkKind) -> Option<&SinkCounters> {
        self.sinks
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, counters)| counters.as_ref())
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, Clock> {
        // The clock holds plain values; a poisoned lock still has usable data.
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> MetricsAggregator {
        MetricsAggregator::new(
            Duration::from_secs(5),
            true,
            &[SinkKind::Csv, SinkKind::Kafka],
        )
    }

    #[test]
    fn test_counters_only_for_active_sinks() {
        let metrics = aggregator();
        assert!(metrics.sink_counters(SinkKind::Csv).is_some());
        assert!(metrics.sink_counters(SinkKind::Parquet).is_none());

        // Unknown sinks are ignored rather than panicking.
        metrics.record_sink_written(SinkKind::Parquet, 5);
        metrics.record_sink_error(SinkKind::Parquet, 5);
        assert!(metrics.report_final().sink(SinkKind::Parquet).is_none());
    }

    #[test]
    fn test_shared_counters_visible_in_reports() {
        let metrics = aggregator();
        let csv = metrics.sink_counters(SinkKind::Csv).unwrap();

        metrics.record_generated(100);
        csv.add_accepted(100);
        csv.add_written(60);
        metrics.record_sink_written(SinkKind::Csv, 40);
        metrics.record_sink_error(SinkKind::Kafka, 3);

        let report = metrics.report_final();
        assert_eq!(report.total_generated, 100);
        let csv_report = report.sink(SinkKind::Csv).unwrap();
        assert_eq!(csv_report.accepted, 100);
        assert_eq!(csv_report.written, 100);
        assert_eq!(report.sink(SinkKind::Kafka).unwrap().errors, 3);
    }

    #[test]
    fn test_periodic_interval_count_resets() {
        let metrics = aggregator();
        metrics.record_generated(10);
        let first = metrics.report_periodic();
        assert_eq!(first.total_generated, 10);

        metrics.record_generated(5);
        let second = metrics.report_periodic();
        assert_eq!(second.total_generated, 15);
        assert!(second.elapsed >= first.elapsed);
    }

    #[test]
    fn test_start_clock_excludes_setup_time() {
        let metrics = aggregator();
        std::thread::sleep(Duration::from_millis(20));
        metrics.start_clock();
        assert!(metrics.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_stops_on_cancel() {
        let metrics = Arc::new(MetricsAggregator::new(
            Duration::from_millis(100),
            false,
            &[SinkKind::Csv],
        ));
        let stop = CancellationToken::new();
        let handle = metrics.spawn_reporter(stop.clone());

        tokio::time::sleep(Duration::from_millis(350)).await;
        stop.cancel();
        handle.await.unwrap();
    }
}
