//! Fan-out from the generator to every active sink.
//!
//! Each sink owns a bounded queue. [`Distributor::submit`] places a copy of
//! the record in every queue that is still open, so each sink sees the full
//! stream. A full queue only holds up the submitting worker; copies already
//! placed in other queues are visible to their sinks immediately.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use txn_core::{SinkKind, SubmitError, Transaction, TransactionOutput, TransactionStream};
use txn_metrics::SinkCounters;

struct Lane {
    kind: SinkKind,
    tx: mpsc::Sender<Transaction>,
    active: AtomicBool,
    counters: Arc<SinkCounters>,
}

/// Broadcasts records into per-sink queues.
///
/// Clones share the same lanes. A sink's queue closes once every clone has
/// been dropped, which is how sinks learn that generation is over.
#[derive(Clone)]
pub struct Distributor {
    lanes: Arc<[Lane]>,
    cancel: CancellationToken,
}

impl Distributor {
    /// Create one queue of `capacity` per sink.
    ///
    /// Returns the distributor and each sink's input stream, in the order the
    /// sinks were given.
    pub fn new(
        capacity: usize,
        sinks: Vec<(SinkKind, Arc<SinkCounters>)>,
        cancel: CancellationToken,
    ) -> (Self, Vec<TransactionStream>) {
        let mut lanes = Vec::with_capacity(sinks.len());
        let mut streams = Vec::with_capacity(sinks.len());
        for (kind, counters) in sinks {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            lanes.push(Lane {
                kind,
                tx,
                active: AtomicBool::new(true),
                counters,
            });
            streams.push(TransactionStream::new(rx, cancel.clone()));
        }

        let distributor = Self {
            lanes: lanes.into(),
            cancel,
        };
        (distributor, streams)
    }

    /// Sinks still accepting records.
    pub fn active_sinks(&self) -> Vec<SinkKind> {
        self.lanes
            .iter()
            .filter(|lane| lane.active.load(Ordering::Acquire))
            .map(|lane| lane.kind)
            .collect()
    }

    /// Drop this handle. Queues close when the last clone is gone.
    pub fn close(self) {
        debug!(sinks = self.lanes.len(), "Distributor handle closed");
    }

    async fn deliver(&self, lane: &Lane, txn: Transaction) -> Delivery {
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Delivery::Cancelled,
            sent = lane.tx.send(txn) => sent,
        };
        match sent {
            Ok(()) => {
                lane.counters.add_accepted(1);
                Delivery::Accepted
            }
            Err(_) => {
                if lane.active.swap(false, Ordering::AcqRel) {
                    if self.cancel.is_cancelled() {
                        debug!(sink = %lane.kind, "Sink queue closed during shutdown");
                    } else {
                        warn!(sink = %lane.kind, "Sink stopped accepting records, no longer distributing to it");
                    }
                }
                Delivery::Closed
            }
        }
    }
}

enum Delivery {
    Accepted,
    Closed,
    Cancelled,
}

#[async_trait]
impl TransactionOutput for Distributor {
    /// Copy `txn` into every active lane.
    ///
    /// Cancellation stops the broadcast at the next lane still waiting for
    /// capacity. A record already taken by some lane is reported as `Ok`, so
    /// it is counted as generated exactly when at least one sink holds it.
    async fn submit(&self, txn: Transaction) -> Result<(), SubmitError> {
        let mut delivered = false;
        let mut cancelled = false;
        let mut pending: Option<&Lane> = None;

        // Clone for every active lane but the last, which takes the original.
        for lane in self
            .lanes
            .iter()
            .filter(|lane| lane.active.load(Ordering::Acquire))
        {
            if let Some(previous) = pending.replace(lane) {
                match self.deliver(previous, txn.clone()).await {
                    Delivery::Accepted => delivered = true,
                    Delivery::Closed => {}
                    Delivery::Cancelled => {
                        cancelled = true;
                        pending = None;
                        break;
                    }
                }
            }
        }
        if let Some(last) = pending {
            match self.deliver(last, txn).await {
                Delivery::Accepted => delivered = true,
                Delivery::Closed => {}
                Delivery::Cancelled => cancelled = true,
            }
        }

        if delivered {
            Ok(())
        } else if cancelled {
            Err(SubmitError::Cancelled)
        } else {
            Err(SubmitError::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(seq: u64) -> Transaction {
        Transaction {
            id: format!("TXN-20240101-{seq:08}"),
            external_transaction_id: format!("EXT-EVOLUTION-{seq:08}"),
            vendor_bet_id: format!("BET-{seq:08}"),
            round_id: format!("ROUND-{:08}", seq / 10),
            vendor_id: 2,
            vendor_code: "EVOLUTION".to_string(),
            vendor_line_id: 1,
            game_category_id: 1,
            house_id: 1,
            master_agent_id: 10,
            agent_id: 11,
            currency_id: 1,
            currency_code: "USD".to_string(),
            bet_amount: "100.000000".to_string(),
            win_amount: "150.000000".to_string(),
            win_loss: "50.000000".to_string(),
            settled_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn lanes(kinds: &[SinkKind]) -> Vec<(SinkKind, Arc<SinkCounters>)> {
        kinds.iter().map(|k| (*k, Arc::default())).collect()
    }

    #[tokio::test]
    async fn test_every_sink_receives_every_record() {
        let sinks = lanes(&[SinkKind::Csv, SinkKind::Parquet, SinkKind::Kafka]);
        let counters: Vec<_> = sinks.iter().map(|(_, c)| Arc::clone(c)).collect();
        let (distributor, streams) = Distributor::new(64, sinks, CancellationToken::new());

        let readers: Vec<_> = streams
            .into_iter()
            .map(|mut stream| {
                tokio::spawn(async move {
                    let mut ids = Vec::new();
                    while let Some(txn) = stream.recv().await {
                        ids.push(txn.id);
                    }
                    ids
                })
            })
            .collect();

        for seq in 1..=50 {
            distributor.submit(txn(seq)).await.unwrap();
        }
        distributor.close();

        for reader in readers {
            let ids = reader.await.unwrap();
            assert_eq!(ids.len(), 50);
            assert_eq!(ids[0], "TXN-20240101-00000001");
        }
        for c in counters {
            assert_eq!(c.accepted(), 50);
        }
    }

    #[tokio::test]
    async fn test_stopped_sink_does_not_block_others() {
        let (distributor, mut streams) = Distributor::new(
            4,
            lanes(&[SinkKind::Csv, SinkKind::Parquet]),
            CancellationToken::new(),
        );
        // The CSV sink goes away before anything is sent.
        let parquet = streams.pop().unwrap();
        drop(streams);

        let reader = tokio::spawn(async move {
            let mut stream = parquet;
            let mut count = 0;
            while stream.recv().await.is_some() {
                count += 1;
            }
            count
        });

        for seq in 1..=20 {
            distributor.submit(txn(seq)).await.unwrap();
        }
        assert_eq!(distributor.active_sinks(), vec![SinkKind::Parquet]);
        distributor.close();
        assert_eq!(reader.await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_submit_fails_when_no_sink_is_left() {
        let (distributor, streams) =
            Distributor::new(4, lanes(&[SinkKind::Csv]), CancellationToken::new());
        drop(streams);

        assert_eq!(
            distributor.submit(txn(1)).await,
            Err(SubmitError::Closed)
        );
        assert!(distributor.active_sinks().is_empty());
    }

    #[tokio::test]
    async fn test_queues_close_with_last_clone() {
        let (distributor, mut streams) =
            Distributor::new(4, lanes(&[SinkKind::Csv]), CancellationToken::new());
        let worker = distributor.clone();
        distributor.close();

        worker.submit(txn(1)).await.unwrap();
        drop(worker);

        let stream = &mut streams[0];
        assert!(stream.recv().await.is_some());
        assert!(stream.recv().await.is_none());
    }
    #[tokio::test]
    async fn test_cancel_mid_broadcast_reports_partial_delivery() {
        let sinks = lanes(&[SinkKind::Csv, SinkKind::Parquet]);
        let counters: Vec<_> = sinks.iter().map(|(_, c)| Arc::clone(c)).collect();
        let cancel = CancellationToken::new();
        let (distributor, mut streams) = Distributor::new(1, sinks, cancel.clone());

        // Fill the Parquet lane; nobody reads it.
        distributor.submit(txn(1)).await.unwrap();
        let mut csv = streams.remove(0);
        assert!(csv.recv().await.is_some());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        // CSV takes the copy, Parquet stays full until cancellation.
        assert_eq!(distributor.submit(txn(2)).await, Ok(()));
        assert_eq!(counters[0].accepted(), 2);
        assert_eq!(counters[1].accepted(), 1);

        // Nothing is accepted once cancelled.
        assert_eq!(
            distributor.submit(txn(3)).await,
            Err(SubmitError::Cancelled)
        );
        assert_eq!(counters[0].accepted(), 2);
        drop(streams);
    }
}
