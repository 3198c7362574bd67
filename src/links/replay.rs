//! Replay link for recorded reader captures

use bytes::Bytes;
use std::path::Path;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::link::Link;
use crate::types::PortId;
use crate::{IngestError, Result};

/// Link that plays back raw reader bytes.
///
/// Bytes are handed out in chunks of at most `chunk_size`, optionally one
/// chunk per pacing tick to approximate the timing of a live reader. Without
/// pacing every read yields to the scheduler, so the rest of the pipeline
/// keeps up with the replay. The link reports end of stream once every byte
/// has been delivered.
pub struct ReplayLink {
    port: PortId,
    data: Bytes,
    position: usize,
    chunk_size: usize,
    pacing: Option<Interval>,
}

impl ReplayLink {
    /// Replay an in-memory capture
    pub fn from_bytes(port: impl Into<PortId>, data: impl Into<Bytes>) -> Self {
        Self { port: port.into(), data: data.into(), position: 0, chunk_size: 256, pacing: None }
    }

    /// Replay a capture file. The port is named after the file path.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| IngestError::file_error(path.to_path_buf(), e))?;

        info!(path = %path.display(), bytes = data.len(), "Opened capture file");
        Ok(Self::from_bytes(PortId::new(path.display().to_string()), data))
    }

    /// Limit how many bytes a single read returns
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Deliver at most one chunk per `period`
    pub fn with_pacing(mut self, period: Duration) -> Self {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.pacing = Some(ticker);
        self
    }

    /// Bytes not yet delivered
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

#[async_trait::async_trait]
impl Link for ReplayLink {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.remaining() == 0 {
            debug!(port = %self.port, "Reached end of replay");
            return Ok(None);
        }

        match self.pacing.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            // Unpaced replay is always ready; give the ingest task a turn per chunk
            None => tokio::task::yield_now().await,
        }

        let n = self.remaining().min(self.chunk_size).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;

        trace!(port = %self.port, bytes = n, remaining = self.remaining(), "Replayed chunk");
        Ok(Some(n))
    }

    fn port(&self) -> &PortId {
        &self.port
    }
}
