//! Periodic finalization and exclusion housekeeping

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sink::SightingSink;
use crate::tracker::TagSessionTracker;
use crate::types::FinalizedSighting;

/// Closes eligible sessions on a fixed period and delivers them to a sink.
///
/// Finalization decisions are taken under the tracker lock; delivery happens
/// after it is released.
pub struct FinalizationSweeper<S: SightingSink> {
    tracker: Arc<TagSessionTracker>,
    sink: S,
    period: Duration,
    emitted: Arc<AtomicU64>,
}

impl<S: SightingSink> FinalizationSweeper<S> {
    pub fn new(tracker: Arc<TagSessionTracker>, sink: S, period: Duration) -> Self {
        Self { tracker, sink, period, emitted: Arc::new(AtomicU64::new(0)) }
    }

    /// Counter of sightings the sink accepted
    pub fn emitted(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.emitted)
    }

    /// Sweep until `flush` fires, then close every remaining session.
    ///
    /// Returns the sink so callers can inspect or reuse it.
    pub async fn run(mut self, flush: CancellationToken) -> S {
        debug!(period_ms = self.period.as_millis() as u64, "Finalization sweeper started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = flush.cancelled() => break,
                _ = ticker.tick() => {
                    let ready = self.tracker.finalize_eligible(Instant::now());
                    self.deliver(ready).await;
                }
            }
        }

        let remaining = self.tracker.flush_all(Instant::now());
        info!(sessions = remaining.len(), "Flushing live sessions");
        self.deliver(remaining).await;

        if let Err(e) = self.sink.flush().await {
            warn!("Sink flush failed: {}", e);
        }

        debug!(emitted = self.emitted.load(Ordering::Relaxed), "Finalization sweeper stopped");
        self.sink
    }

    async fn deliver(&mut self, sightings: Vec<FinalizedSighting>) {
        for sighting in sightings {
            let tag = sighting.tag.clone();
            match self.sink.emit(sighting).await {
                Ok(()) => {
                    self.emitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(tag = %tag, "Failed to deliver sighting: {}", e),
            }
        }
    }
}

/// Purge expired exclusion entries every `period` until `stop` fires.
pub async fn run_exclusion_cleanup(
    tracker: Arc<TagSessionTracker>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let purged = tracker.purge_expired_exclusions(Instant::now());
                if purged > 0 {
                    debug!(purged, "Purged expired exclusions");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinalizationPolicy;
    use crate::sink::ChannelSink;
    use crate::test_utils::reading_at;
    use crate::types::TagId;
    use tokio::time::{advance, sleep};

    const TAG_A: &str = "E20000172210000000000001";
    const TAG_B: &str = "E20000172210000000000002";

    fn tracker(policy: FinalizationPolicy, exclusion_ms: u64) -> Arc<TagSessionTracker> {
        Arc::new(TagSessionTracker::new(policy, Duration::from_millis(exclusion_ms)))
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_emitted_after_threshold() {
        let tracker = tracker(FinalizationPolicy::IdleTimeout { idle_ms: 1000 }, 10_000);
        let (sink, mut stream) = ChannelSink::new(8);
        let sweeper = FinalizationSweeper::new(Arc::clone(&tracker), sink, Duration::from_millis(100));
        let emitted = sweeper.emitted();
        let flush = CancellationToken::new();
        let task = tokio::spawn(sweeper.run(flush.clone()));

        let t0 = Instant::now();
        tracker.record(&reading_at(TAG_A, "p0", t0));
        advance(Duration::from_millis(300)).await;
        tracker.record(&reading_at(TAG_A, "p0", Instant::now()));

        // 1000 ms after the last reading the session is still live
        sleep(Duration::from_millis(950)).await;
        assert!(tracker.is_live(&TagId::from(TAG_A)));

        sleep(Duration::from_millis(200)).await;
        let sighting = stream.as_mut().try_recv().expect("sighting emitted");
        assert_eq!(sighting.reading_count, 2);
        assert_eq!(sighting.first_seen, t0);
        assert_eq!(sighting.dwell(), Duration::from_millis(300));
        assert_eq!(emitted.load(Ordering::Relaxed), 1);

        flush.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn flush_closes_every_live_session() {
        let tracker = tracker(FinalizationPolicy::IdleTimeout { idle_ms: 60_000 }, 10_000);
        let (sink, mut stream) = ChannelSink::new(8);
        let flush = CancellationToken::new();
        let task = tokio::spawn(
            FinalizationSweeper::new(Arc::clone(&tracker), sink, Duration::from_millis(100)).run(flush.clone()),
        );

        let now = Instant::now();
        tracker.record(&reading_at(TAG_B, "p0", now));
        tracker.record(&reading_at(TAG_A, "p0", now + Duration::from_millis(5)));
        sleep(Duration::from_millis(250)).await;
        assert!(stream.as_mut().try_recv().is_err());

        flush.cancel();
        drop(task.await.unwrap());

        let first = stream.as_mut().try_recv().unwrap();
        let second = stream.as_mut().try_recv().unwrap();
        assert_eq!(first.tag.as_str(), TAG_B);
        assert_eq!(second.tag.as_str(), TAG_A);
        assert_eq!(tracker.stats().live_sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_purges_expired_entries() {
        let tracker = tracker(FinalizationPolicy::IdleTimeout { idle_ms: 100 }, 1_000);
        tracker.record(&reading_at(TAG_A, "p0", Instant::now()));
        assert_eq!(tracker.finalize_eligible(Instant::now() + Duration::from_millis(200)).len(), 1);
        assert_eq!(tracker.stats().excluded_tags, 1);

        let stop = CancellationToken::new();
        let task = tokio::spawn(run_exclusion_cleanup(
            Arc::clone(&tracker),
            Duration::from_millis(500),
            stop.clone(),
        ));

        sleep(Duration::from_millis(2_100)).await;
        assert_eq!(tracker.stats().excluded_tags, 0);

        stop.cancel();
        task.await.unwrap();
    }
}
