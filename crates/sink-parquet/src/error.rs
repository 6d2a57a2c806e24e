//! Error types for the Parquet sink.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;
use txn_core::{SinkError, SinkKind};

/// Errors that can occur while writing Parquet output.
#[derive(Error, Debug)]
pub enum ParquetSinkError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parquet encoder or file error.
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Record batch construction failed.
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Write attempted after the sink was closed.
    #[error("Parquet sink is already closed")]
    Closed,
}

impl From<ParquetSinkError> for SinkError {
    fn from(err: ParquetSinkError) -> Self {
        match err {
            ParquetSinkError::Io(e) => SinkError::Io(e),
            ParquetSinkError::Closed => SinkError::Closed(SinkKind::Parquet),
            other => SinkError::Backend {
                sink: SinkKind::Parquet,
                message: other.to_string(),
            },
        }
    }
}
