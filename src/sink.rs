//! Sighting sinks
//!
//! The pipeline hands every [`FinalizedSighting`] to a [`SightingSink`]
//! exactly once, in the order finalization was decided. Sinks run on the
//! finalization task, never while the tracker lock is held.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::types::FinalizedSighting;
use crate::{IngestError, Result};

/// Stream of sightings produced by a [`ChannelSink`]
pub type SightingStream = ReceiverStream<FinalizedSighting>;

/// Destination for finalized sightings
#[async_trait::async_trait]
pub trait SightingSink: Send + 'static {
    /// Deliver one sighting.
    ///
    /// Errors are logged by the pipeline and do not stop it.
    async fn emit(&mut self, sighting: FinalizedSighting) -> Result<()>;

    /// Called once after the final sweep on shutdown.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl SightingSink for Box<dyn SightingSink> {
    async fn emit(&mut self, sighting: FinalizedSighting) -> Result<()> {
        (**self).emit(sighting).await
    }

    async fn flush(&mut self) -> Result<()> {
        (**self).flush().await
    }
}

/// Sink that forwards sightings to a bounded channel.
///
/// The receiving half is exposed as a [`SightingStream`]. Delivery waits for
/// channel capacity, so a slow stream consumer slows the finalization task
/// but never the capture loops.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<FinalizedSighting>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, SightingStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ReceiverStream::new(rx))
    }
}

#[async_trait::async_trait]
impl SightingSink for ChannelSink {
    async fn emit(&mut self, sighting: FinalizedSighting) -> Result<()> {
        self.tx.send(sighting).await.map_err(|_| IngestError::Task {
            task: "sighting channel".to_string(),
            details: "stream receiver dropped".to_string(),
        })
    }
}

/// Sink that logs one `info` event per sighting
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl SightingSink for LogSink {
    async fn emit(&mut self, sighting: FinalizedSighting) -> Result<()> {
        info!(
            tag = %sighting.tag,
            readings = sighting.reading_count,
            ports = sighting.port_count(),
            mean_rssi_dbm = format_args!("{:.2}", sighting.mean_rssi_dbm),
            peak_rssi_dbm = sighting.peak_rssi_dbm,
            dwell_ms = sighting.dwell().as_millis() as u64,
            "Tag sighting"
        );
        Ok(())
    }
}
