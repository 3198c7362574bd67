//! Bounded hand-off between capture loops and the tracker
//!
//! Every port pushes without blocking; a full queue drops the reading and
//! counts the drop, so a slow consumer never stalls serial capture. The single
//! consumer pops with a timeout and sees [`Pop::Closed`] once every producer
//! is gone and the buffer is empty.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::TagReading;

/// Result of a non-blocking push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Queue was full; the reading was dropped
    Dropped,
    /// Consumer is gone
    Closed,
}

/// Result of a timed pop
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    Reading(TagReading),
    /// Nothing arrived within the timeout
    Empty,
    /// All producers dropped and the buffer is drained
    Closed,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dropped: u64,
}

/// Shared read-only view of the queue counters
#[derive(Debug, Clone)]
pub struct QueueMonitor {
    counters: Arc<Counters>,
}

impl QueueMonitor {
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Bounded multi-producer, single-consumer reading queue
pub struct SightingQueue;

impl SightingQueue {
    /// Create a queue holding at most `capacity` pending readings.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; [`PipelineConfig::validate`](crate::PipelineConfig::validate)
    /// rejects that value before a pipeline is built.
    pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
        let (tx, rx) = mpsc::channel(capacity);
        let counters = Arc::new(Counters::default());
        (
            QueueProducer { tx, counters: Arc::clone(&counters) },
            QueueConsumer { rx, counters },
        )
    }
}

/// Producer side; clone one per port
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<TagReading>,
    counters: Arc<Counters>,
}

impl QueueProducer {
    /// Push without waiting; drops the reading if the queue is full.
    pub fn try_push(&self, reading: TagReading) -> PushOutcome {
        match self.tx.try_send(reading) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Enqueued
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    pub fn monitor(&self) -> QueueMonitor {
        QueueMonitor { counters: Arc::clone(&self.counters) }
    }
}

/// Consumer side, owned by the ingest task
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<TagReading>,
    counters: Arc<Counters>,
}

impl QueueConsumer {
    /// Wait up to `timeout` for the next reading.
    pub async fn pop_timeout(&mut self, timeout: Duration) -> Pop {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(reading)) => Pop::Reading(reading),
            Ok(None) => Pop::Closed,
            Err(_) => Pop::Empty,
        }
    }

    /// Take a reading if one is buffered.
    pub fn try_pop(&mut self) -> Option<TagReading> {
        self.rx.try_recv().ok()
    }

    /// Number of readings waiting
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn monitor(&self) -> QueueMonitor {
        QueueMonitor { counters: Arc::clone(&self.counters) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::reading_at;
    use tokio::time::Instant;

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let (producer, mut consumer) = SightingQueue::bounded(2);
        let now = Instant::now();

        assert_eq!(producer.try_push(reading_at("T1", "p0", now)), PushOutcome::Enqueued);
        assert_eq!(producer.try_push(reading_at("T2", "p0", now)), PushOutcome::Enqueued);
        assert_eq!(producer.try_push(reading_at("T3", "p0", now)), PushOutcome::Dropped);

        let stats = producer.monitor().stats();
        assert_eq!(stats, QueueStats { enqueued: 2, dropped: 1 });
        assert_eq!(consumer.pending(), 2);

        // FIFO order, the third reading never made it in
        assert_eq!(consumer.try_pop().map(|r| r.tag.to_string()), Some("T1".to_string()));
        assert_eq!(consumer.try_pop().map(|r| r.tag.to_string()), Some("T2".to_string()));
        assert!(consumer.try_pop().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_then_reports_closed() {
        let (producer, mut consumer) = SightingQueue::bounded(4);

        assert_eq!(consumer.pop_timeout(Duration::from_millis(50)).await, Pop::Empty);

        producer.try_push(reading_at("T1", "p0", Instant::now()));
        drop(producer);

        assert!(matches!(consumer.pop_timeout(Duration::from_millis(50)).await, Pop::Reading(_)));
        assert_eq!(consumer.pop_timeout(Duration::from_millis(50)).await, Pop::Closed);
    }

    #[tokio::test]
    async fn push_after_consumer_dropped_reports_closed() {
        let (producer, consumer) = SightingQueue::bounded(1);
        drop(consumer);
        assert_eq!(producer.try_push(reading_at("T1", "p0", Instant::now())), PushOutcome::Closed);
        assert_eq!(producer.monitor().stats().dropped, 0);
    }
}
