//! Record generator and its worker pool.

use crate::amounts::{
    format_amount, scale_bet_amount, win_multiplier, BASE_BET_AMOUNTS, VENDOR_CODES,
    WIN_MULTIPLIERS,
};
use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use txn_core::{ReferenceData, SubmitError, Transaction, TransactionOutput};
use txn_metrics::MetricsAggregator;

/// Consecutive sequence numbers that share a round id.
pub const ROUND_SIZE: u64 = 10;

/// Error type for generator operations.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Cancellation was requested before all records were produced.
    #[error("generation cancelled after {generated} records")]
    Cancelled { generated: u64 },

    /// The output stopped accepting records.
    #[error("output closed after {generated} records")]
    OutputClosed { generated: u64 },

    /// Batch generation was asked to run without workers.
    #[error("worker count must be positive")]
    NoWorkers,

    /// A worker task panicked or was aborted.
    #[error("generator worker failed: {0}")]
    Worker(String),
}

/// Per-worker outcome; totals are attached when the pool is joined.
enum WorkerExit {
    Cancelled,
    OutputClosed,
}

/// Produces transactions from shared reference data.
///
/// Cloning is cheap and clones share the sequence counter, so every clone
/// belongs to the same run. Independent runs use independent generators.
#[derive(Clone)]
pub struct RecordGenerator {
    reference: Arc<ReferenceData>,
    sequence: Arc<AtomicU64>,
    metrics: Option<Arc<MetricsAggregator>>,
    seed: Option<u64>,
}

impl RecordGenerator {
    /// Create a generator whose first record has sequence number 1.
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self {
            reference,
            sequence: Arc::new(AtomicU64::new(0)),
            metrics: None,
            seed: None,
        }
    }

    /// Count every submitted record in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Derive worker RNGs from `seed` instead of the clock.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Continue numbering after `sequence`.
    pub fn with_start_sequence(self, sequence: u64) -> Self {
        self.sequence.store(sequence, Ordering::SeqCst);
        self
    }

    /// Last sequence number handed out.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// An RNG for one worker, seeded from the clock (or the fixed seed) and
    /// the worker index.
    pub fn worker_rng(&self, worker: usize) -> StdRng {
        let base = self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });
        StdRng::seed_from_u64(worker_seed(base, worker))
    }

    /// Build one transaction.
    ///
    /// Draws, in order: currency, game category, master agent, agent,
    /// vendor code, vendor id, base bet, win multiplier.
    pub fn generate_one<R: Rng + ?Sized>(&self, rng: &mut R) -> Transaction {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let reference = &self.reference;

        let currencies = reference.currencies();
        let currency = &currencies[rng.gen_range(0..currencies.len())];
        let categories = reference.game_categories();
        let category = &categories[rng.gen_range(0..categories.len())];

        let masters = reference.master_agent_ids();
        let master_agent_id = masters[rng.gen_range(0..masters.len())];
        let agents = reference.agents_for_master(master_agent_id);
        let agent = &agents[rng.gen_range(0..agents.len())];

        let vendor_code = VENDOR_CODES[rng.gen_range(0..VENDOR_CODES.len())];
        let vendor_id: i32 = rng.gen_range(1..=10);

        let base = Decimal::from(BASE_BET_AMOUNTS[rng.gen_range(0..BASE_BET_AMOUNTS.len())]);
        let bet_amount = scale_bet_amount(&currency.code, base);
        let multiplier = win_multiplier(rng.gen_range(0..WIN_MULTIPLIERS.len()));
        let win_amount = bet_amount * multiplier;
        let win_loss = win_amount - bet_amount;

        Transaction {
            id: format!("TXN-{}-{:08}", now.format("%Y%m%d"), seq),
            external_transaction_id: format!("EXT-{vendor_code}-{seq:08}"),
            vendor_bet_id: format!("BET-{seq:08}"),
            round_id: format!("ROUND-{:08}", seq / ROUND_SIZE),
            vendor_id,
            vendor_code: vendor_code.to_string(),
            vendor_line_id: 1,
            game_category_id: category.id,
            house_id: 1,
            master_agent_id: agent.master_agent_id,
            agent_id: agent.id,
            currency_id: currency.id,
            currency_code: currency.code.clone(),
            bet_amount: format_amount(bet_amount),
            win_amount: format_amount(win_amount),
            win_loss: format_amount(win_loss),
            settled_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Generate `count` records across `workers` concurrent workers.
    ///
    /// Worker `i` handles the contiguous index range `partition(count,
    /// workers)[i]`; the last worker absorbs the remainder. Returns the number
    /// of records submitted once every worker has finished.
    pub async fn generate_batch<O: TransactionOutput>(
        &self,
        count: u64,
        workers: usize,
        output: O,
        cancel: CancellationToken,
    ) -> Result<u64, GenerationError> {
        if workers == 0 {
            return Err(GenerationError::NoWorkers);
        }

        info!(count, workers, "Starting batch generation");

        let mut pool = JoinSet::new();
        for (worker, range) in partition(count, workers).into_iter().enumerate() {
            let generator = self.clone();
            let rng = self.worker_rng(worker);
            let output = output.clone();
            let cancel = cancel.clone();
            pool.spawn(async move {
                let assigned = range.end - range.start;
                let result = generator.run_range(range, rng, &output, &cancel).await;
                debug!(worker, assigned, "Generator worker finished");
                result
            });
        }
        drop(output);

        let mut generated = 0u64;
        let mut exit = None;
        let mut failure = None;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok((emitted, reason)) => {
                    generated += emitted;
                    if let Some(reason) = reason {
                        exit.get_or_insert(reason);
                    }
                }
                Err(e) => {
                    failure.get_or_insert(e.to_string());
                }
            }
        }

        if let Some(message) = failure {
            return Err(GenerationError::Worker(message));
        }
        match exit {
            Some(WorkerExit::Cancelled) => Err(GenerationError::Cancelled { generated }),
            Some(WorkerExit::OutputClosed) => Err(GenerationError::OutputClosed { generated }),
            None => {
                info!(generated, "Batch generation complete");
                Ok(generated)
            }
        }
    }

    /// Generate from a single loop until `cancel` fires.
    ///
    /// Cancellation is the normal way out and yields `Ok` with the number of
    /// records submitted.
    pub async fn generate_continuous<O: TransactionOutput>(
        &self,
        output: O,
        cancel: CancellationToken,
    ) -> Result<u64, GenerationError> {
        info!("Starting continuous generation");
        let rng = self.worker_rng(0);
        let (generated, exit) = self.run_range(0..u64::MAX, rng, &output, &cancel).await;
        match exit {
            None | Some(WorkerExit::Cancelled) => {
                info!(generated, "Continuous generation stopped");
                Ok(generated)
            }
            Some(WorkerExit::OutputClosed) => Err(GenerationError::OutputClosed { generated }),
        }
    }

    /// Emit one record per index in `range`, checking cancellation before
    /// each record.
    ///
    /// `submit` is never abandoned midway: the output observes cancellation
    /// itself, and a record that reached any destination is counted.
    async fn run_range<O: TransactionOutput>(
        &self,
        range: Range<u64>,
        mut rng: StdRng,
        output: &O,
        cancel: &CancellationToken,
    ) -> (u64, Option<WorkerExit>) {
        let mut emitted = 0u64;
        for _ in range {
            if cancel.is_cancelled() {
                return (emitted, Some(WorkerExit::Cancelled));
            }
            let txn = self.generate_one(&mut rng);
            match output.submit(txn).await {
                Ok(()) => {
                    emitted += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_generated(1);
                    }
                }
                Err(SubmitError::Cancelled) => return (emitted, Some(WorkerExit::Cancelled)),
                Err(SubmitError::Closed) => return (emitted, Some(WorkerExit::OutputClosed)),
            }
        }
        (emitted, None)
    }
}

fn worker_seed(base: u64, worker: usize) -> u64 {
    base.wrapping_add((worker as u64 + 1).wrapping_mul(0x9E3779B97F4A7C15))
}

/// Split `count` indices into `workers` contiguous ranges.
///
/// Every range has `count / workers` indices except the last, which also
/// takes the remainder.
pub fn partition(count: u64, workers: usize) -> Vec<Range<u64>> {
    if workers == 0 {
        return Vec::new();
    }
    let per_worker = count / workers as u64;
    (0..workers as u64)
        .map(|i| {
            let start = i * per_worker;
            let end = if i == workers as u64 - 1 {
                count
            } else {
                start + per_worker
            };
            start..end
        })
        .collect()
}
