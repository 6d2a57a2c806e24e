//! Sink and output capabilities.
//!
//! A [`Sink`] consumes a [`TransactionStream`] (its own bounded queue) and
//! persists what it receives. The generator side only sees
//! [`TransactionOutput`], which the pipeline's distributor implements by
//! copying every record into each active sink's queue.

use crate::transaction::Transaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identifies a sink variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Csv,
    Parquet,
    Kafka,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Csv => "csv",
            SinkKind::Parquet => "parquet",
            SinkKind::Kafka => "kafka",
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by any sink through the [`Sink`] trait.
///
/// Each sink crate has its own error type that converts into this one.
#[derive(Error, Debug)]
pub enum SinkError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (encoder, file format, broker client).
    #[error("{sink} sink error: {message}")]
    Backend { sink: SinkKind, message: String },

    /// The sink was used after `close`.
    #[error("{0} sink is already closed")]
    Closed(SinkKind),
}

/// An output destination for transactions.
///
/// The lifecycle is `write` (until the stream ends or is cancelled), then
/// `close` exactly once. `count` may be read at any time.
#[async_trait]
pub trait Sink: Send {
    /// Which variant this is.
    fn kind(&self) -> SinkKind;

    /// Consume the stream, buffering and flushing as configured.
    ///
    /// Returns once the stream is exhausted, after flushing whatever was
    /// buffered. An `Err` stops only this sink.
    async fn write(&mut self, input: TransactionStream) -> Result<(), SinkError>;

    /// Flush anything still buffered and release resources.
    async fn close(&mut self) -> Result<(), SinkError>;

    /// Records persisted (or acknowledged) so far.
    fn count(&self) -> u64;

    /// File written by this sink, if it writes one.
    fn output_path(&self) -> Option<&Path> {
        None
    }
}

/// A sink's input queue, closed either by the producer side hanging up or
/// by cancellation.
///
/// On cancellation the queue stops accepting new records but everything
/// already accepted is still yielded, so a sink's final count equals the
/// number of records that made it into its queue.
pub struct TransactionStream {
    rx: mpsc::Receiver<Transaction>,
    cancel: CancellationToken,
    draining: bool,
}

impl TransactionStream {
    pub fn new(rx: mpsc::Receiver<Transaction>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancel,
            draining: false,
        }
    }

    /// Next record, or `None` once the queue is closed and empty.
    pub async fn recv(&mut self) -> Option<Transaction> {
        if !self.draining {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.draining = true;
                    self.rx.close();
                }
                txn = self.rx.recv() => return txn,
            }
        }
        self.rx.recv().await
    }

    /// Whether cancellation has been observed.
    pub fn is_draining(&self) -> bool {
        self.draining
    }
}

/// Why a record could not be submitted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Cancellation was requested while submitting.
    #[error("submission cancelled")]
    Cancelled,

    /// No sink is accepting records any more.
    #[error("no active sink is accepting records")]
    Closed,
}

/// Destination the generator submits records to.
///
/// Cloned once per generator worker.
#[async_trait]
pub trait TransactionOutput: Clone + Send + Sync + 'static {
    /// Hand one record over, waiting for queue capacity if needed.
    ///
    /// Implementations watch for cancellation themselves and return
    /// [`SubmitError::Cancelled`] instead of waiting. `Ok` means at least
    /// one destination holds the record, even if cancellation cut the rest
    /// short.
    async fn submit(&self, txn: Transaction) -> Result<(), SubmitError>;
}
