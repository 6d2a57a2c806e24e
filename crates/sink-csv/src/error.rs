//! Error types for the CSV sink.

use thiserror::Error;
use txn_core::{SinkError, SinkKind};

/// Errors that can occur while writing CSV output.
#[derive(Error, Debug)]
pub enum CsvSinkError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Write attempted after the sink was closed.
    #[error("CSV sink is already closed")]
    Closed,
}

impl From<CsvSinkError> for SinkError {
    fn from(err: CsvSinkError) -> Self {
        match err {
            CsvSinkError::Io(e) => SinkError::Io(e),
            CsvSinkError::Csv(e) => SinkError::Backend {
                sink: SinkKind::Csv,
                message: e.to_string(),
            },
            CsvSinkError::Closed => SinkError::Closed(SinkKind::Csv),
        }
    }
}
