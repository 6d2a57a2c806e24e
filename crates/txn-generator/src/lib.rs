//! Transaction generator for txn-producer.
//!
//! This crate provides the [`RecordGenerator`], which builds internally
//! consistent [`Transaction`](txn_core::Transaction) records from the shared
//! [`ReferenceData`](txn_core::ReferenceData) and submits them to a
//! [`TransactionOutput`](txn_core::TransactionOutput).
//!
//! # Architecture
//!
//! ```text
//!            ReferenceData (Arc, read-only)
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────┐
//! │  RecordGenerator                         │
//! │   - sequence (AtomicU64, one per run)    │
//! │                                          │
//! │   worker 0 ── StdRng ──┐                 │
//! │   worker 1 ── StdRng ──┤                 │
//! │   ...                  ├── submit() ─────┼──▶ TransactionOutput
//! │   worker N ── StdRng ──┘                 │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Workers never share an RNG and never take a lock; the sequence counter is
//! the only state they share.
//!
//! # Example
//!
//! ```rust,ignore
//! use txn_generator::RecordGenerator;
//!
//! let generator = RecordGenerator::new(reference);
//! let mut rng = generator.worker_rng(0);
//! let txn = generator.generate_one(&mut rng);
//! assert_eq!(txn.sequence(), Some(1));
//! ```

pub mod amounts;
pub mod generator;

// Re-exports for convenience
pub use amounts::{format_amount, scale_bet_amount, BASE_BET_AMOUNTS, VENDOR_CODES};
pub use generator::{partition, GenerationError, RecordGenerator, ROUND_SIZE};
