//! Arrow schema for transactions and batch conversion.

use arrow::array::{ArrayRef, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::basic::{Compression as ParquetCompression, GzipLevel, ZstdLevel};
use std::sync::Arc;
use txn_core::{Compression, Transaction, TRANSACTION_COLUMNS};

/// Columns stored as Int32; every other column is Utf8.
const INT32_COLUMNS: [&str; 7] = [
    "vendor_id",
    "vendor_line_id",
    "game_category_id",
    "house_id",
    "master_agent_id",
    "agent_id",
    "currency_id",
];

/// Arrow schema with one non-nullable field per transaction column.
pub fn transaction_schema() -> SchemaRef {
    let fields: Vec<Field> = TRANSACTION_COLUMNS
        .iter()
        .map(|name| {
            let data_type = if INT32_COLUMNS.contains(name) {
                DataType::Int32
            } else {
                DataType::Utf8
            };
            Field::new(*name, data_type, false)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Parquet codec for a configured compression.
pub fn parquet_compression(compression: Compression) -> ParquetCompression {
    match compression {
        Compression::None => ParquetCompression::UNCOMPRESSED,
        Compression::Snappy => ParquetCompression::SNAPPY,
        Compression::Gzip => ParquetCompression::GZIP(GzipLevel::default()),
        Compression::Lz4 => ParquetCompression::LZ4_RAW,
        Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
    }
}

fn strings<'a>(rows: &'a [Transaction], f: impl Fn(&'a Transaction) -> &'a str) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(rows.iter().map(f)))
}

fn ints(rows: &[Transaction], f: impl Fn(&Transaction) -> i32) -> ArrayRef {
    Arc::new(Int32Array::from_iter_values(rows.iter().map(f)))
}

/// Convert buffered rows into a record batch matching `schema`.
pub(crate) fn to_record_batch(
    schema: &SchemaRef,
    rows: &[Transaction],
) -> Result<RecordBatch, ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        strings(rows, |t| t.id.as_str()),
        strings(rows, |t| t.external_transaction_id.as_str()),
        strings(rows, |t| t.vendor_bet_id.as_str()),
        strings(rows, |t| t.round_id.as_str()),
        ints(rows, |t| t.vendor_id),
        strings(rows, |t| t.vendor_code.as_str()),
        ints(rows, |t| t.vendor_line_id),
        ints(rows, |t| t.game_category_id),
        ints(rows, |t| t.house_id),
        ints(rows, |t| t.master_agent_id),
        ints(rows, |t| t.agent_id),
        ints(rows, |t| t.currency_id),
        strings(rows, |t| t.currency_code.as_str()),
        strings(rows, |t| t.bet_amount.as_str()),
        strings(rows, |t| t.win_amount.as_str()),
        strings(rows, |t| t.win_loss.as_str()),
        strings(rows, |t| t.settled_at.as_str()),
    ];
    RecordBatch::try_new(Arc::clone(schema), columns)
}
