//! CSV file sink for txn-producer.
//!
//! Writes one header row naming the transaction columns when the sink is
//! created, then one row per record. Records are buffered and written in
//! batches of the configured size.
//!
//! # Example
//!
//! ```ignore
//! use sink_csv::CsvSink;
//!
//! let mut sink = CsvSink::create("/app/output/transactions.csv", 10_000, counters)?;
//! sink.write(stream).await?;
//! sink.close().await?;
//! println!("{} rows", sink.count());
//! ```

mod error;
mod sink;

pub use error::CsvSinkError;
pub use sink::CsvSink;
