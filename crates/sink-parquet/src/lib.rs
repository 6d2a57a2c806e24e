//! Parquet file sink for txn-producer.
//!
//! Records are buffered up to the configured row-group size and each full
//! buffer is written as one row group. Closing the sink writes any trailing
//! row group and the file footer; a file that was never closed is not
//! readable.

mod error;
mod schema;
mod sink;

pub use error::ParquetSinkError;
pub use schema::{parquet_compression, transaction_schema};
pub use sink::ParquetSink;
