//! Row-group buffered Parquet writer implementing [`Sink`].

use crate::error::ParquetSinkError;
use crate::schema::{parquet_compression, to_record_batch, transaction_schema};
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use txn_core::{Compression, Sink, SinkError, SinkKind, Transaction, TransactionStream};
use txn_metrics::SinkCounters;

/// Parquet file sink.
pub struct ParquetSink {
    path: PathBuf,
    schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
    buffer: Vec<Transaction>,
    row_group_size: usize,
    count: u64,
    row_groups: usize,
    counters: Arc<SinkCounters>,
}

impl ParquetSink {
    /// Create the output file with the transaction schema.
    ///
    /// # Arguments
    ///
    /// * `path` - Output file, truncated if it exists
    /// * `row_group_size` - Rows per row group (and per buffered batch)
    /// * `compression` - Column chunk codec
    /// * `counters` - Written/error counters shared with the metrics aggregator
    pub fn create(
        path: impl AsRef<Path>,
        row_group_size: usize,
        compression: Compression,
        counters: Arc<SinkCounters>,
    ) -> Result<Self, ParquetSinkError> {
        let path = path.as_ref().to_path_buf();
        let row_group_size = row_group_size.max(1);
        let schema = transaction_schema();

        let props = WriterProperties::builder()
            .set_compression(parquet_compression(compression))
            .set_max_row_group_size(row_group_size)
            .build();
        let file = File::create(&path)?;
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))?;

        info!(
            path = %path.display(),
            row_group_size,
            compression = %compression,
            "Parquet sink initialized"
        );

        Ok(Self {
            path,
            schema,
            writer: Some(writer),
            buffer: Vec::with_capacity(row_group_size),
            row_group_size,
            count: 0,
            row_groups: 0,
            counters,
        })
    }

    /// Row groups written so far.
    pub fn row_groups(&self) -> usize {
        self.row_groups
    }

    /// Write the buffer as one row group.
    fn flush_buffer(&mut self) -> Result<(), ParquetSinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(ParquetSinkError::Closed)?;

        let batch = to_record_batch(&self.schema, &self.buffer)?;
        let rows = batch.num_rows() as u64;
        self.buffer.clear();
        writer.write(&batch)?;
        writer.flush()?;

        self.count += rows;
        self.row_groups += 1;
        self.counters.add_written(rows);
        debug!(rows, total = self.count, "Parquet row group written");
        Ok(())
    }
}

#[async_trait]
impl Sink for ParquetSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Parquet
    }

    async fn write(&mut self, mut input: TransactionStream) -> Result<(), SinkError> {
        if self.writer.is_none() {
            return Err(ParquetSinkError::Closed.into());
        }
        while let Some(txn) = input.recv().await {
            self.buffer.push(txn);
            if self.buffer.len() >= self.row_group_size {
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
        if let Some(writer) = self.writer.take() {
            writer.close().map_err(ParquetSinkError::from)?;
        }
        flushed?;
        info!(
            path = %self.path.display(),
            rows = self.count,
            row_groups = self.row_groups,
            "Parquet sink closed"
        );
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
    use arrow::array::{Array, Int32Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn txn(seq: u64) -> Transaction {
        Transaction {
            id: format!("TXN-20240101-{seq:08}"),
            external_transaction_id: format!("EXT-EGT-{seq:08}"),
            vendor_bet_id: format!("BET-{seq:08}"),
            round_id: format!("ROUND-{:08}", seq / 10),
            vendor_id: 7,
            vendor_code: "EGT".to_string(),
            vendor_line_id: 1,
            game_category_id: 4,
            house_id: 1,
            master_agent_id: 200,
            agent_id: 2000 + seq as i32,
            currency_id: 2,
            currency_code: "BTC".to_string(),
            bet_amount: "0.010000".to_string(),
            win_amount: "0.020000".to_string(),
            win_loss: "0.010000".to_string(),
            settled_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    async fn feed(records: &[Transaction]) -> TransactionStream {
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            tx.send(record.clone()).await.unwrap();
        }
        TransactionStream::new(rx, CancellationToken::new())
    }

    fn read_back(path: &Path) -> (usize, Vec<(String, i32, String)>) {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap()).unwrap();
        let row_groups = builder.metadata().num_row_groups();
        let mut rows = Vec::new();
        for batch in builder.build().unwrap() {
            let batch = batch.unwrap();
            let ids = batch
                .column_by_name("id")
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            let agents = batch
                .column_by_name("agent_id")
                .unwrap()
                .as_any()
                .downcast_ref::<Int32Array>()
                .unwrap();
            let bets = batch
                .column_by_name("bet_amount")
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            for i in 0..batch.num_rows() {
                assert!(!ids.is_null(i));
                rows.push((
                    ids.value(i).to_string(),
                    agents.value(i),
                    bets.value(i).to_string(),
                ));
            }
        }
        (row_groups, rows)
    }

    #[tokio::test]
    async fn test_row_group_per_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        let counters = Arc::new(SinkCounters::default());
        let mut sink =
            ParquetSink::create(&path, 10, Compression::Snappy, Arc::clone(&counters)).unwrap();
        let records: Vec<Transaction> = (1..=25).map(txn).collect();

        sink.write(feed(&records).await).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(sink.count(), 25);
        assert_eq!(sink.row_groups(), 3);
        assert_eq!(counters.written(), 25);

        let (row_groups, rows) = read_back(&path);
        assert_eq!(row_groups, 3);
        assert_eq!(rows.len(), 25);
    }

    #[tokio::test]
    async fn test_round_trip_every_codec() {
        for compression in [
            Compression::None,
            Compression::Snappy,
            Compression::Gzip,
            Compression::Lz4,
            Compression::Zstd,
        ] {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("out.parquet");
            let records: Vec<Transaction> = (1..=4).map(txn).collect();
            let mut sink = ParquetSink::create(&path, 100, compression, Arc::default()).unwrap();

            sink.write(feed(&records).await).await.unwrap();
            sink.close().await.unwrap();

            let (_, rows) = read_back(&path);
            let expected: Vec<(String, i32, String)> = records
                .iter()
                .map(|t| (t.id.clone(), t.agent_id, t.bet_amount.clone()))
                .collect();
            assert_eq!(rows, expected, "codec {compression}");
        }
    }

    #[tokio::test]
    async fn test_close_without_records_writes_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.parquet");
        let mut sink = ParquetSink::create(&path, 10, Compression::Zstd, Arc::default()).unwrap();
        sink.close().await.unwrap();

        let (row_groups, rows) = read_back(&path);
        assert_eq!(row_groups, 0);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let mut sink = ParquetSink::create(
            dir.path().join("out.parquet"),
            10,
            Compression::None,
            Arc::default(),
        )
        .unwrap();
        sink.close().await.unwrap();

        let err = sink.write(feed(&[txn(1)]).await).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed(SinkKind::Parquet)));
    }
}
