//! Report types and formatting helpers.

use serde::Serialize;
use std::time::Duration;
use txn_core::SinkKind;

/// Qualitative throughput band used by the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Assessment {
    Excellent,
    Good,
    Moderate,
    Low,
}

impl Assessment {
    /// Band for an average rate in records per second.
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 30_000.0 {
            Assessment::Excellent
        } else if rate >= 20_000.0 {
            Assessment::Good
        } else if rate >= 10_000.0 {
            Assessment::Moderate
        } else {
            Assessment::Low
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Assessment::Excellent => "EXCELLENT: Exceeded 30K messages/sec target",
            Assessment::Good => "GOOD: Met 20K messages/sec target",
            Assessment::Moderate => "MODERATE: Performance below target (10K-20K/sec)",
            Assessment::Low => "LOW: Performance significantly below target (<10K/sec)",
        }
    }
}

/// Counts for one sink at the time of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub kind: SinkKind,
    /// Records the distributor placed in this sink's queue.
    pub accepted: u64,
    /// Records the sink persisted or had acknowledged.
    pub written: u64,
    pub errors: u64,
}

/// Snapshot emitted on every reporting interval.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodicReport {
    pub elapsed: Duration,
    pub total_generated: u64,
    /// Average since the start of the run.
    pub overall_rate: f64,
    /// Rate over the interval since the previous report.
    pub interval_rate: f64,
    pub sinks: Vec<SinkReport>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub total_generated: u64,
    pub elapsed: Duration,
    pub average_rate: f64,
    pub assessment: Assessment,
    pub sinks: Vec<SinkReport>,
}

impl FinalReport {
    /// Counts for one sink, if it was active.
    pub fn sink(&self, kind: SinkKind) -> Option<&SinkReport> {
        self.sinks.iter().find(|s| s.kind == kind)
    }

    /// Sum of error counts across sinks.
    pub fn total_errors(&self) -> u64 {
        self.sinks.iter().map(|s| s.errors).sum()
    }
}

/// Records per second, zero for an empty interval.
pub(crate) fn rate(count: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Human-readable duration: `Nms`, `N.NNs` or `N.Nm`.
pub fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else if d < Duration::from_secs(60) {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{:.1}m", d.as_secs_f64() / 60.0)
    }
}

/// Human-readable throughput.
pub fn format_rate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.2}M msg/sec", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.2}K msg/sec", rate / 1_000.0)
    } else {
        format!("{rate:.0} msg/sec")
    }
}
