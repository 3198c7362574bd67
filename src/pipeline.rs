//! Pipeline assembly and lifecycle
//!
//! [`Pipeline::start`] spawns one capture task per link, a single ingest task
//! feeding the shared tracker, the finalization sweeper and the exclusion
//! cleanup task. [`PipelineHandle::shutdown`] stops them in dependency order:
//!
//! 1. capture loops stop and close their links
//! 2. the ingest task drains every reading already queued
//! 3. the sweeper closes all live sessions and delivers them
//! 4. exclusion cleanup stops
//!
//! Must be called from within a Tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureSummary, PortCaptureLoop};
use crate::config::PipelineConfig;
use crate::link::Link;
use crate::queue::{Pop, QueueConsumer, QueueMonitor, QueueStats, SightingQueue};
use crate::sink::SightingSink;
use crate::sweeper::{FinalizationSweeper, run_exclusion_cleanup};
use crate::tracker::{RecordOutcome, TagSessionTracker, TrackerStats};
use crate::{IngestError, Result};

/// Point-in-time pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub queue: QueueStats,
    pub tracker: TrackerStats,
    /// Sightings the sink accepted
    pub sightings_emitted: u64,
}

/// Final accounting returned by [`PipelineHandle::shutdown`]
#[derive(Debug)]
pub struct PipelineReport {
    /// One summary per link, in the order the links were supplied
    pub ports: Vec<CaptureSummary>,
    pub stats: PipelineStats,
}

/// Entry point for building a running pipeline
pub struct Pipeline;

impl Pipeline {
    /// Validate `config` and spawn all pipeline tasks.
    ///
    /// Fails with [`IngestError::NoHardware`] when `links` is empty; nothing
    /// is spawned in that case.
    pub fn start<L, S>(config: PipelineConfig, links: Vec<L>, sink: S) -> Result<PipelineHandle>
    where
        L: Link,
        S: SightingSink,
    {
        config.validate()?;
        if links.is_empty() {
            return Err(IngestError::NoHardware);
        }

        let stop = CancellationToken::new();
        let flush = CancellationToken::new();
        let drained = CancellationToken::new();

        let tracker = Arc::new(TagSessionTracker::from_config(&config));
        let (producer, consumer) = SightingQueue::bounded(config.queue_capacity);
        let monitor = producer.monitor();

        let captures = links
            .into_iter()
            .map(|link| {
                let capture = PortCaptureLoop::new(link, producer.clone(), config.read_chunk_size);
                tokio::spawn(capture.run(stop.clone()))
            })
            .collect::<Vec<_>>();
        // Capture loops hold the only producers; the queue closes when they all exit
        drop(producer);

        let ingest = tokio::spawn(ingest_task(
            consumer,
            Arc::clone(&tracker),
            config.read_timeout(),
            flush.clone(),
        ));

        let sweeper = FinalizationSweeper::new(Arc::clone(&tracker), sink, config.sweep_interval());
        let emitted = sweeper.emitted();
        let sweep_flush = flush.clone();
        let sweep_drained = drained.clone();
        let sweeper = tokio::spawn(async move {
            drop(sweeper.run(sweep_flush).await);
            sweep_drained.cancel();
        });

        let cleanup = tokio::spawn(run_exclusion_cleanup(
            Arc::clone(&tracker),
            config.exclusion_cleanup_interval(),
            stop.clone(),
        ));

        info!(
            ports = captures.len(),
            policy = ?config.policy,
            exclusion_ms = config.exclusion_ms,
            "Pipeline started"
        );

        Ok(PipelineHandle {
            stop,
            drained,
            tracker,
            monitor,
            emitted,
            tasks: Some(Tasks { captures, ingest, sweeper, cleanup }),
        })
    }
}

struct Tasks {
    captures: Vec<JoinHandle<CaptureSummary>>,
    ingest: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

/// Handle to a running pipeline.
///
/// Dropping the handle requests stop without waiting; call
/// [`shutdown`](Self::shutdown) to drain and collect the final report.
pub struct PipelineHandle {
    stop: CancellationToken,
    drained: CancellationToken,
    tracker: Arc<TagSessionTracker>,
    monitor: QueueMonitor,
    emitted: Arc<AtomicU64>,
    tasks: Option<Tasks>,
}

impl PipelineHandle {
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            queue: self.monitor.stats(),
            tracker: self.tracker.stats(),
            sightings_emitted: self.emitted.load(Ordering::Relaxed),
        }
    }

    /// Shared tracker, for inspection
    pub fn tracker(&self) -> &Arc<TagSessionTracker> {
        &self.tracker
    }

    /// Whether every link has ended and all sessions were flushed
    pub fn is_drained(&self) -> bool {
        self.drained.is_cancelled()
    }

    /// Wait until every link has ended on its own and the final flush ran.
    ///
    /// Only completes for finite links such as
    /// [`ReplayLink`](crate::links::ReplayLink) or after a link failure on
    /// every port.
    pub async fn wait_drained(&self) {
        self.drained.cancelled().await;
    }

    /// Stop capture, drain queued readings, flush live sessions and join all tasks.
    pub async fn shutdown(mut self) -> Result<PipelineReport> {
        info!("Pipeline shutting down");
        self.stop.cancel();

        let Some(tasks) = self.tasks.take() else {
            return Err(IngestError::Task {
                task: "pipeline".to_string(),
                details: "already shut down".to_string(),
            });
        };

        let mut ports = Vec::with_capacity(tasks.captures.len());
        for capture in tasks.captures {
            ports.push(capture.await.map_err(|e| task_failed("capture", e))?);
        }
        tasks.ingest.await.map_err(|e| task_failed("ingest", e))?;
        tasks.sweeper.await.map_err(|e| task_failed("sweeper", e))?;
        tasks.cleanup.await.map_err(|e| task_failed("exclusion cleanup", e))?;

        let stats = self.stats();
        info!(
            ports = ports.len(),
            sightings = stats.sightings_emitted,
            dropped = stats.queue.dropped,
            "Pipeline stopped"
        );

        Ok(PipelineReport { ports, stats })
    }
}

impl PipelineHandle {
    /// [`shutdown`](Self::shutdown), giving up after `limit`.
    ///
    /// Draining can stall when a sink stops accepting sightings, for example
    /// a [`ChannelSink`](crate::ChannelSink) whose stream is no longer read.
    /// On timeout the tasks have already been told to stop and are left to
    /// finish in the background.
    pub async fn shutdown_within(self, limit: Duration) -> Result<PipelineReport> {
        match tokio::time::timeout(limit, self.shutdown()).await {
            Ok(report) => report,
            Err(_) => {
                warn!(limit_ms = limit.as_millis() as u64, "Pipeline did not drain in time");
                Err(IngestError::Timeout { duration: limit })
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.tasks.is_some() {
            debug!("Pipeline handle dropped, requesting stop");
            self.stop.cancel();
        }
    }
}

fn task_failed(task: &str, err: JoinError) -> IngestError {
    IngestError::Task { task: task.to_string(), details: err.to_string() }
}

async fn ingest_task(
    mut consumer: QueueConsumer,
    tracker: Arc<TagSessionTracker>,
    poll: Duration,
    flush: CancellationToken,
) {
    debug!("Ingest task started");
    let mut ingested = 0u64;

    loop {
        match consumer.pop_timeout(poll).await {
            Pop::Reading(reading) => {
                ingested += 1;
                let outcome = tracker.record(&reading);
                if outcome == RecordOutcome::Opened {
                    debug!(tag = %reading.tag, port = %reading.port, "Session opened");
                } else {
                    trace!(tag = %reading.tag, ?outcome, "Reading recorded");
                }
            }
            Pop::Empty => continue,
            Pop::Closed => break,
        }
    }

    debug!(ingested, "Reading queue drained");
    flush.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureOutcome;
    use crate::config::FinalizationPolicy;
    use crate::sink::ChannelSink;
    use crate::test_utils::{LinkStep, ScriptedLink, epc, tag_notice_bytes};
    use tokio::time::sleep;

    fn config(policy: FinalizationPolicy) -> PipelineConfig {
        PipelineConfig { policy, exclusion_ms: 10_000, ..PipelineConfig::default() }
    }

    #[tokio::test]
    async fn no_links_is_no_hardware() {
        let (sink, _stream) = ChannelSink::new(4);
        let result = Pipeline::start(PipelineConfig::default(), Vec::<ScriptedLink>::new(), sink);
        assert!(matches!(result, Err(IngestError::NoHardware)));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let (sink, _stream) = ChannelSink::new(4);
        let config = PipelineConfig { queue_capacity: 0, ..PipelineConfig::default() };
        let link = ScriptedLink::new("p0", vec![]);
        let result = Pipeline::start(config, vec![link], sink);
        assert!(matches!(result, Err(IngestError::Config { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_period_closes_all_sessions_together() {
        let (sink, mut stream) = ChannelSink::new(16);
        let link = ScriptedLink::new(
            "p0",
            vec![
                LinkStep::Bytes(tag_notice_bytes(0xC8, epc(1))),
                LinkStep::Pause(Duration::from_millis(100)),
                LinkStep::Bytes(tag_notice_bytes(0xC8, epc(2))),
            ],
        );
        let handle =
            Pipeline::start(config(FinalizationPolicy::QuietPeriod { quiet_ms: 1200 }), vec![link], sink).unwrap();

        sleep(Duration::from_millis(1000)).await;
        assert!(stream.as_mut().try_recv().is_err());
        assert_eq!(handle.stats().tracker.live_sessions, 2);

        sleep(Duration::from_millis(600)).await;
        let first = stream.as_mut().try_recv().unwrap();
        let second = stream.as_mut().try_recv().unwrap();
        assert!(first.first_seen < second.first_seen);
        assert!(first.tag.as_str().ends_with("01"));
        assert!(second.tag.as_str().ends_with("02"));

        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.stats.sightings_emitted, 2);
        assert_eq!(report.stats.tracker.excluded_tags, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_live_sessions() {
        let _ = tracing_subscriber::fmt::try_init();
        let (sink, mut stream) = ChannelSink::new(16);
        let link = ScriptedLink::new("p0", vec![LinkStep::Bytes(tag_notice_bytes(0xC8, epc(7)))]);
        let handle =
            Pipeline::start(config(FinalizationPolicy::IdleTimeout { idle_ms: 60_000 }), vec![link], sink).unwrap();

        sleep(Duration::from_millis(300)).await;
        assert_eq!(handle.stats().tracker.live_sessions, 1);

        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.ports.len(), 1);
        assert!(matches!(report.ports[0].outcome, CaptureOutcome::Stopped));
        assert_eq!(report.stats.sightings_emitted, 1);
        assert!(stream.as_mut().try_recv().unwrap().tag.as_str().ends_with("07"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_readings_still_queued() {
        let burst: Vec<u8> = (0..2000u32).flat_map(|i| tag_notice_bytes(0xC8, epc((i % 20) as u8))).collect();
        let (sink, mut stream) = ChannelSink::new(32);
        let link = ScriptedLink::new("p0", vec![LinkStep::Bytes(burst)]);
        let handle =
            Pipeline::start(config(FinalizationPolicy::IdleTimeout { idle_ms: 60_000 }), vec![link], sink).unwrap();

        // One scheduler turn: the burst is queued, ingest has only started on it
        tokio::task::yield_now().await;
        let stats = handle.stats();
        let ingested = stats.tracker.readings_accepted + stats.tracker.readings_suppressed;
        assert_eq!(stats.queue.enqueued, 2000);
        assert!(ingested < stats.queue.enqueued, "queue already empty before shutdown");

        let report = handle.shutdown().await.unwrap();
        let tracker = report.stats.tracker;
        assert_eq!(tracker.readings_accepted + tracker.readings_suppressed, 2000);
        assert_eq!(report.stats.sightings_emitted, 20);

        let mut total = 0;
        while let Ok(sighting) = stream.as_mut().try_recv() {
            total += sighting.reading_count;
        }
        assert_eq!(total, 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_sink_times_out_shutdown() {
        let burst: Vec<u8> = (1..=3).flat_map(|n| tag_notice_bytes(0xC8, epc(n))).collect();
        // Room for one sighting; the stream is never read
        let (sink, _stream) = ChannelSink::new(1);
        let link = ScriptedLink::new("p0", vec![LinkStep::Bytes(burst)]);
        let handle =
            Pipeline::start(config(FinalizationPolicy::IdleTimeout { idle_ms: 60_000 }), vec![link], sink).unwrap();
        sleep(Duration::from_millis(100)).await;

        let err = handle.shutdown_within(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, IngestError::Timeout { duration } if duration == Duration::from_secs(1)));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_within_returns_report_when_drained() {
        let (sink, _stream) = ChannelSink::new(4);
        let link = ScriptedLink::new("p0", vec![LinkStep::Bytes(tag_notice_bytes(0xC8, epc(1)))]);
        let handle =
            Pipeline::start(config(FinalizationPolicy::IdleTimeout { idle_ms: 800 }), vec![link], sink).unwrap();

        let report = handle.shutdown_within(Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.ports.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drained_after_every_link_ends() {
        let (sink, _stream) = ChannelSink::new(16);
        let link = ScriptedLink::new(
            "p0",
            vec![LinkStep::Bytes(tag_notice_bytes(0xC8, epc(1))), LinkStep::End],
        );
        let handle =
            Pipeline::start(config(FinalizationPolicy::IdleTimeout { idle_ms: 800 }), vec![link], sink).unwrap();

        handle.wait_drained().await;
        assert!(handle.is_drained());
        assert_eq!(handle.stats().sightings_emitted, 1);

        let report = handle.shutdown().await.unwrap();
        assert!(matches!(report.ports[0].outcome, CaptureOutcome::Ended));
    }
}
