//! Buffered CSV writer implementing [`Sink`].

use crate::error::CsvSinkError;
use async_trait::async_trait;
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use txn_core::{Sink, SinkError, SinkKind, Transaction, TransactionStream, TRANSACTION_COLUMNS};
use txn_metrics::SinkCounters;

/// Capacity of the underlying file buffer.
const FILE_BUFFER_SIZE: usize = 64 * 1024;

/// CSV file sink.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<Writer<BufWriter<File>>>,
    buffer: Vec<Transaction>,
    buffer_size: usize,
    count: u64,
    counters: Arc<SinkCounters>,
}

impl CsvSink {
    /// Create the output file and write the header row.
    ///
    /// # Arguments
    ///
    /// * `path` - Output file, truncated if it exists
    /// * `buffer_size` - Records buffered between writes
    /// * `counters` - Written/error counters shared with the metrics aggregator
    pub fn create(
        path: impl AsRef<Path>,
        buffer_size: usize,
        counters: Arc<SinkCounters>,
    ) -> Result<Self, CsvSinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::with_capacity(FILE_BUFFER_SIZE, file));
        writer.write_record(TRANSACTION_COLUMNS)?;
        writer.flush()?;

        info!(path = %path.display(), buffer_size, "CSV sink initialized");

        let buffer_size = buffer_size.max(1);
        Ok(Self {
            path,
            writer: Some(writer),
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            count: 0,
            counters,
        })
    }

    /// Write every buffered record and flush the file.
    ///
    /// A record that fails to serialize is counted as an error and skipped;
    /// I/O failures abort the flush.
    fn flush_buffer(&mut self) -> Result<(), CsvSinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(CsvSinkError::Closed)?;

        let mut written = 0u64;
        let mut skipped = 0u64;
        for txn in self.buffer.drain(..) {
            match writer.serialize(&txn) {
                Ok(()) => written += 1,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    warn!(id = %txn.id, error = %e, "Skipping record that failed to serialize");
                    skipped += 1;
                }
            }
        }
        writer.flush()?;

        self.count += written;
        self.counters.add_written(written);
        if skipped > 0 {
            self.counters.add_errors(skipped);
        }
        debug!(written, total = self.count, "CSV batch flushed");
        Ok(())
    }
}

#[async_trait]
impl Sink for CsvSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Csv
    }

    async fn write(&mut self, mut input: TransactionStream) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Err(CsvSinkError::Closed.into());
        }
        while let Some(txn) = input.recv().await {
            self.buffer.push(txn);
            if self.buffer.len() >= self.buffer_size {
                self.flush_buffer()?;
            }
        }
        self.flush_buffer()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Ok(());
        }
        let flushed = self.flush_buffer();
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        flushed?;
        info!(path = %self.path.display(), rows = self.count, "CSV sink closed");
        Ok(())
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn output_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn txn(seq: u64) -> Transaction {
        Transaction {
            id: format!("TXN-20240101-{seq:08}"),
            external_transaction_id: format!("EXT-NETENT-{seq:08}"),
            vendor_bet_id: format!("BET-{seq:08}"),
            round_id: format!("ROUND-{:08}", seq / 10),
            vendor_id: 3,
            vendor_code: "NETENT".to_string(),
            vendor_line_id: 1,
            game_category_id: 2,
            house_id: 1,
            master_agent_id: 100,
            agent_id: 1001,
            currency_id: 1,
            currency_code: "USD".to_string(),
            bet_amount: "50.000000".to_string(),
            win_amount: "25.000000".to_string(),
            win_loss: "-25.000000".to_string(),
            settled_at: "2024-01-01T12:00:00Z".to_string(),
        }
    }

    async fn feed(records: Vec<Transaction>) -> TransactionStream {
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            tx.send(record).await.unwrap();
        }
        TransactionStream::new(rx, CancellationToken::new())
    }

    #[test]
    fn test_header_written_on_create() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvSink::create(&path, 10, Arc::default()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), TRANSACTION_COLUMNS.join(","));
        assert_eq!(sink.output_path(), Some(path.as_path()));
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn test_write_flushes_partial_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let counters = Arc::new(SinkCounters::default());
        let mut sink = CsvSink::create(&path, 10, Arc::clone(&counters)).unwrap();

        sink.write(feed((1..=25).map(txn).collect()).await)
            .await
            .unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 26);
        assert_eq!(sink.count(), 25);
        assert_eq!(counters.written(), 25);
        assert_eq!(counters.errors(), 0);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let records: Vec<Transaction> = (1..=5).map(txn).collect();
        let mut sink = CsvSink::create(&path, 2, Arc::default()).unwrap();

        sink.write(feed(records.clone()).await).await.unwrap();
        sink.close().await.unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(headers, TRANSACTION_COLUMNS);
        let parsed: Vec<Transaction> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(parsed, records);
    }

    #[tokio::test]
    async fn test_cancelled_stream_is_drained() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path, 100, Arc::default()).unwrap();

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        for seq in 1..=3 {
            tx.send(txn(seq)).await.unwrap();
        }
        cancel.cancel();

        // The sender is still alive; cancellation alone ends the stream.
        sink.write(TransactionStream::new(rx, cancel)).await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(sink.count(), 3);
        drop(tx);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::create(dir.path().join("out.csv"), 10, Arc::default()).unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        let err = sink.write(feed(vec![txn(1)]).await).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed(SinkKind::Csv)));
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = CsvSink::create(dir.path().join("missing/out.csv"), 10, Arc::default());
        assert!(matches!(result, Err(CsvSinkError::Io(_))));
    }
}
