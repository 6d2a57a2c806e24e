//! Kafka producer implementing [`Sink`].

use crate::config::KafkaSinkConfig;
use crate::error::KafkaSinkError;
use async_trait::async_trait;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use txn_core::{Sink, SinkError, SinkKind, Transaction, TransactionStream};
use txn_metrics::SinkCounters;

/// Pause before retrying a send rejected by a full local queue.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Upper bound on how long `close` waits for outstanding messages.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery reports waiting for the acknowledgment task.
const ACK_QUEUE_CAPACITY: usize = 100_000;

/// JSON payload for one transaction.
pub fn encode_payload(txn: &Transaction) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(txn)
}

/// Success and failure tallies for delivery reports.
#[derive(Debug)]
struct DeliveryTracker {
    delivered: AtomicU64,
    counters: Arc<SinkCounters>,
}

impl DeliveryTracker {
    fn record(&self, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.counters.add_written(1);
            }
            Err(e) => {
                warn!(error = %e, "Kafka delivery failed");
                self.counters.add_errors(1);
            }
        }
    }
}

async fn await_delivery(delivery: DeliveryFuture) -> Result<(), String> {
    match delivery.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err((e, _))) => Err(e.to_string()),
        Err(_) => Err("delivery report dropped by producer".to_string()),
    }
}

/// Kafka sink.
///
/// With `async_delivery` off, each delivery report is awaited before the next
/// record is published. Once the input is draining after cancellation, reports
/// always go to the acknowledgment task so only the bounded flush in `close`
/// waits on the broker.
pub struct KafkaSink {
    config: KafkaSinkConfig,
    producer: FutureProducer,
    tracker: Arc<DeliveryTracker>,
    acks: Option<mpsc::Sender<DeliveryFuture>>,
    ack_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl KafkaSink {
    /// Create the producer and start the acknowledgment task.
    ///
    /// No connection is made here; librdkafka connects on first use.
    pub fn new(
        config: KafkaSinkConfig,
        counters: Arc<SinkCounters>,
    ) -> Result<Self, KafkaSinkError> {
        config.validate()?;
        let producer: FutureProducer = config.client_config().create()?;

        let tracker = Arc::new(DeliveryTracker {
            delivered: AtomicU64::new(0),
            counters,
        });

        let (acks, mut rx) = mpsc::channel::<DeliveryFuture>(ACK_QUEUE_CAPACITY);
        let ack_tracker = Arc::clone(&tracker);
        let ack_task = tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                ack_tracker.record(await_delivery(delivery).await);
            }
            debug!("Kafka acknowledgment task finished");
        });

        info!(
            brokers = %config.brokers.join(","),
            topic = %config.topic,
            compression = %config.compression,
            batch_size = config.batch_size,
            linger_ms = config.linger.as_millis() as u64,
            async_delivery = config.async_delivery,
            "Kafka sink initialized"
        );

        Ok(Self {
            config,
            producer,
            tracker,
            acks: Some(acks),
            ack_task: Some(ack_task),
            closed: false,
        })
    }

    /// Enqueue one record with the producer, waiting out a full local queue.
    async fn enqueue(&self, key: &str, payload: &[u8]) -> Result<DeliveryFuture, KafkaError> {
        let mut record = FutureRecord::to(&self.config.topic)
            .key(key)
            .payload(payload);
        loop {
            match self.producer.send_result(record) {
                Ok(delivery) => return Ok(delivery),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned)) => {
                    record = returned;
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                Err((e, _)) => return Err(e),
            }
        }
    }

    async fn publish(&self, txn: &Transaction, draining: bool) {
        let payload = match encode_payload(txn) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(id = %txn.id, error = %e, "Skipping record that failed to encode");
                self.tracker.counters.add_errors(1);
                return;
            }
        };

        let delivery = match self.enqueue(&txn.id, &payload).await {
            Ok(delivery) => delivery,
            Err(e) => {
                self.tracker.record(Err(e.to_string()));
                return;
            }
        };

        let inline = !self.config.async_delivery && !draining;
        match &self.acks {
            Some(acks) if !inline => {
                if let Err(mpsc::error::SendError(delivery)) = acks.send(delivery).await {
                    self.tracker.record(await_delivery(delivery).await);
                }
            }
            _ => self.tracker.record(await_delivery(delivery).await),
        }
    }
}

#[async_trait]
impl Sink for KafkaSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Kafka
    }

    async fn write(&mut self, mut input: TransactionStream) -> Result<(), SinkError> {
        if self.closed {
            return Err(KafkaSinkError::Closed.into());
        }
        let mut published = 0u64;
        while let Some(txn) = input.recv().await {
            self.publish(&txn, input.is_draining()).await;
            published += 1;
            if published % 100_000 == 0 {
                debug!(published, "Kafka records handed to producer");
            }
        }
        debug!(published, "Kafka input stream finished");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Dropping the sender lets the acknowledgment task finish once
        // every pending report has resolved.
        self.acks.take();

        let producer = self.producer.clone();
        let flushed =
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
                .await;

        if let Some(task) = self.ack_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Kafka acknowledgment task failed");
            }
        }

        info!(
            topic = %self.config.topic,
            delivered = self.count(),
            errors = self.tracker.counters.errors(),
            "Kafka sink closed"
        );

        match flushed {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(KafkaSinkError::Kafka(e).into()),
            Err(e) => Err(SinkError::Backend {
                sink: SinkKind::Kafka,
                message: format!("flush task failed: {e}"),
            }),
        }
    }

    fn count(&self) -> u64 {
        self.tracker.delivered.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> Transaction {
        Transaction {
            id: "TXN-20240101-00000042".to_string(),
            external_transaction_id: "EXT-PLAYSON-00000042".to_string(),
            vendor_bet_id: "BET-00000042".to_string(),
            round_id: "ROUND-00000004".to_string(),
            vendor_id: 9,
            vendor_code: "PLAYSON".to_string(),
            vendor_line_id: 1,
            game_category_id: 3,
            house_id: 1,
            master_agent_id: 300,
            agent_id: 3001,
            currency_id: 5,
            currency_code: "JPY".to_string(),
            bet_amount: "1000.000000".to_string(),
            win_amount: "0.000000".to_string(),
            win_loss: "-1000.000000".to_string(),
            settled_at: "2024-01-01T08:30:00Z".to_string(),
        }
    }

    #[test]
    fn test_payload_contains_every_field() {
        let payload = encode_payload(&txn()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), txn_core::TRANSACTION_COLUMNS.len());
        assert_eq!(object["id"], "TXN-20240101-00000042");
        assert_eq!(object["agent_id"], 3001);
        assert_eq!(object["win_loss"], "-1000.000000");
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = encode_payload(&txn()).unwrap();
        let decoded: Transaction = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, txn());
    }

    #[test]
    fn test_tracker_counts_outcomes() {
        let counters = Arc::new(SinkCounters::default());
        let tracker = DeliveryTracker {
            delivered: AtomicU64::new(0),
            counters: Arc::clone(&counters),
        };

        tracker.record(Ok(()));
        tracker.record(Ok(()));
        tracker.record(Err("broker unavailable".to_string()));

        assert_eq!(tracker.delivered.load(Ordering::Relaxed), 2);
        assert_eq!(counters.written(), 2);
        assert_eq!(counters.errors(), 1);
    }

    #[test]
    fn test_invalid_config_rejected_before_connecting() {
        let config = KafkaSinkConfig::new(Vec::new(), "transactions");
        assert!(matches!(
            KafkaSink::new(config, Arc::default()),
            Err(KafkaSinkError::InvalidConfig(_))
        ));
    }
    #[tokio::test]
    async fn test_sync_delivery_drain_is_bounded_by_close() {
        use tokio_util::sync::CancellationToken;

        // Nothing listens on port 1, so every message times out.
        let config = KafkaSinkConfig::new(vec!["127.0.0.1:1".to_string()], "transactions")
            .with_async_delivery(false)
            .with_message_timeout(Duration::from_millis(500));
        let counters = Arc::new(SinkCounters::default());
        let mut sink = KafkaSink::new(config, Arc::clone(&counters)).unwrap();

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let stream = TransactionStream::new(rx, cancel.clone());
        for _ in 0..3 {
            tx.send(txn()).await.unwrap();
        }
        cancel.cancel();

        let started = std::time::Instant::now();
        sink.write(stream).await.unwrap();
        let _ = sink.close().await;

        // One message timeout covers the whole drain, not one per record.
        assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
        assert_eq!(sink.count(), 0);
        assert_eq!(counters.errors(), 3);
    }
}
