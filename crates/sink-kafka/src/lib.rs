//! Kafka sink for txn-producer.
//!
//! Every record is published as one JSON message keyed by the transaction id.
//! Delivery reports are consumed by a background task so publishing never
//! waits on the broker unless the sink is configured for synchronous
//! delivery. Failed deliveries are counted, never fatal.
//!
//! # Example
//!
//! ```ignore
//! use sink_kafka::{KafkaSink, KafkaSinkConfig};
//!
//! let config = KafkaSinkConfig::new(vec!["localhost:9092".into()], "transactions");
//! let mut sink = KafkaSink::new(config, counters)?;
//! sink.write(stream).await?;
//! sink.close().await?;
//! ```

mod config;
mod error;
mod sink;

pub use config::KafkaSinkConfig;
pub use error::KafkaSinkError;
pub use sink::{encode_payload, KafkaSink};
