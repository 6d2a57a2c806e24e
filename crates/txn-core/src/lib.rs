//! Core types for the txn-producer pipeline.
//!
//! This crate provides the foundational types shared by the generator, the
//! sinks and the pipeline that wires them together:
//!
//! - [`Transaction`] - One synthesized settlement record (17 fields)
//! - [`ReferenceData`] - Immutable lookup tables built once at startup
//! - [`Sink`] - The capability every output destination implements
//! - [`TransactionStream`] - A sink's cancellable input queue
//! - [`TransactionOutput`] - Where the generator submits records
//! - [`Compression`] - Codec selection shared by the file and broker sinks
//!
//! # Architecture
//!
//! ```text
//! txn-core (this crate)
//!    │
//!    ├─── txn-metrics    (per-sink counters keyed by SinkKind)
//!    ├─── txn-generator  (builds Transactions from ReferenceData)
//!    │
//!    ├─── sink-csv       (implements Sink)
//!    ├─── sink-parquet   (implements Sink)
//!    └─── sink-kafka     (implements Sink)
//! ```

pub mod compression;
pub mod reference;
pub mod sink;
pub mod transaction;

// Re-exports for convenience
pub use compression::Compression;
pub use reference::{
    Agent, Currency, CurrencyRate, DataLoadError, GameCategory, ReferenceData, ReferencePaths,
    ReferenceTables,
};
pub use sink::{
    Sink, SinkError, SinkKind, SubmitError, TransactionOutput, TransactionStream,
};
pub use transaction::{Transaction, TRANSACTION_COLUMNS};
