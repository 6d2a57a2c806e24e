//! Producer settings.

use crate::error::KafkaSinkError;
use rdkafka::ClientConfig;
use std::time::Duration;
use txn_core::Compression;

/// Settings for the Kafka sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSinkConfig {
    /// Bootstrap broker addresses (`host:port`).
    pub brokers: Vec<String>,
    pub topic: String,
    pub compression: Compression,
    /// Maximum messages per broker request.
    pub batch_size: usize,
    /// Maximum time a message waits in the local queue before a batch is sent.
    pub linger: Duration,
    /// Hand deliveries to the acknowledgment task instead of awaiting each one.
    pub async_delivery: bool,
    /// How long librdkafka keeps retrying a message before reporting it failed.
    pub message_timeout: Duration,
}

impl KafkaSinkConfig {
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            compression: Compression::Snappy,
            batch_size: 5000,
            linger: Duration::from_millis(100),
            async_delivery: true,
            message_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_batching(mut self, batch_size: usize, linger: Duration) -> Self {
        self.batch_size = batch_size;
        self.linger = linger;
        self
    }

    pub fn with_async_delivery(mut self, async_delivery: bool) -> Self {
        self.async_delivery = async_delivery;
        self
    }

    pub fn with_message_timeout(mut self, message_timeout: Duration) -> Self {
        self.message_timeout = message_timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), KafkaSinkError> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(KafkaSinkError::InvalidConfig(
                "at least one broker address is required".to_string(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(KafkaSinkError::InvalidConfig(
                "topic must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(KafkaSinkError::InvalidConfig(
                "batch size must be positive".to_string(),
            ));
        }
        if self.message_timeout.is_zero() {
            return Err(KafkaSinkError::InvalidConfig(
                "message timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// librdkafka properties for the producer.
    pub fn client_config(&self) -> ClientConfig {
        let brokers: Vec<&str> = self
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers.join(","))
            .set("compression.type", self.compression.as_str())
            .set("batch.num.messages", self.batch_size.to_string())
            .set("linger.ms", self.linger.as_millis().to_string())
            .set("acks", "1")
            .set("message.send.max.retries", "3")
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            )
            .set("queue.buffering.max.messages", "100000");
        config
    }
}
