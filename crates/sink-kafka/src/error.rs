//! Error types for the Kafka sink.

use thiserror::Error;
use txn_core::{SinkError, SinkKind};

/// Errors that can occur in the Kafka sink.
#[derive(Error, Debug)]
pub enum KafkaSinkError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Invalid Kafka configuration: {0}")]
    InvalidConfig(String),

    #[error("Kafka sink is already closed")]
    Closed,
}

impl From<KafkaSinkError> for SinkError {
    fn from(err: KafkaSinkError) -> Self {
        match err {
            KafkaSinkError::Closed => SinkError::Closed(SinkKind::Kafka),
            other => SinkError::Backend {
                sink: SinkKind::Kafka,
                message: other.to_string(),
            },
        }
    }
}
