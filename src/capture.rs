//! Per-port capture loop
//!
//! One loop per reader. It owns the reader's [`Link`] and [`FrameDecoder`],
//! turns bytes into [`TagReading`](crate::TagReading)s and pushes them onto the
//! reading queue without ever waiting on the consumer.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::IngestError;
use crate::link::Link;
use crate::protocol::{DecoderStats, FrameDecoder, interpret};
use crate::queue::{PushOutcome, QueueProducer};
use crate::types::{CaptureTime, PortId};

/// Why a capture loop ended
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Stop was requested
    Stopped,
    /// The link reported end of stream
    Ended,
    /// The link failed; other ports are unaffected
    LinkFailed(IngestError),
}

/// Per-port totals returned when a capture loop ends
#[derive(Debug)]
pub struct CaptureSummary {
    pub port: PortId,
    pub bytes_read: u64,
    pub decoder: DecoderStats,
    /// Tag readings decoded
    pub readings: u64,
    /// Readings dropped because the queue was full
    pub dropped: u64,
    pub outcome: CaptureOutcome,
}

impl CaptureSummary {
    pub fn link_failed(&self) -> bool {
        matches!(self.outcome, CaptureOutcome::LinkFailed(_))
    }
}

/// Capture loop for one port
pub struct PortCaptureLoop<L: Link> {
    link: L,
    decoder: FrameDecoder,
    producer: QueueProducer,
    chunk_size: usize,
}

impl<L: Link> PortCaptureLoop<L> {
    pub fn new(link: L, producer: QueueProducer, chunk_size: usize) -> Self {
        Self { link, decoder: FrameDecoder::new(), producer, chunk_size: chunk_size.max(1) }
    }

    /// Read until `cancel` fires, the link ends, or the link fails.
    ///
    /// The link is closed before returning in every case.
    pub async fn run(mut self, cancel: CancellationToken) -> CaptureSummary {
        let port = self.link.port().clone();
        info!(port = %port, "Capture loop started");

        let mut buf = vec![0u8; self.chunk_size];
        let mut bytes_read = 0u64;
        let mut readings = 0u64;
        let mut dropped = 0u64;

        let outcome = loop {
            // Use select to allow cancellation during a pending read
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(port = %port, "Capture loop cancelled");
                    break CaptureOutcome::Stopped;
                }
                result = self.link.read_chunk(&mut buf) => result,
            };

            match result {
                Ok(Some(0)) => continue,
                Ok(Some(n)) => {
                    bytes_read += n as u64;
                    let captured = CaptureTime::now();

                    for frame in self.decoder.feed(&buf[..n]) {
                        let Some(reading) = interpret(&frame, &port, captured) else {
                            trace!(
                                port = %port,
                                command = frame.command_code(),
                                "Ignoring non tag-read frame"
                            );
                            continue;
                        };

                        readings += 1;
                        trace!(port = %port, tag = %reading.tag, rssi = reading.rssi.dbm(), "Tag read");

                        match self.producer.try_push(reading) {
                            PushOutcome::Enqueued => {}
                            PushOutcome::Dropped => {
                                dropped += 1;
                                if dropped == 1 || dropped % 1000 == 0 {
                                    warn!(port = %port, dropped, "Reading queue full, dropping readings");
                                }
                            }
                            PushOutcome::Closed => {
                                debug!(port = %port, "Reading queue closed");
                            }
                        }
                    }
                }
                Ok(None) => {
                    info!(port = %port, "Link reached end of stream");
                    break CaptureOutcome::Ended;
                }
                Err(e) => {
                    error!(port = %port, "Link failure, stopping capture on this port: {}", e);
                    break CaptureOutcome::LinkFailed(e);
                }
            }
        };

        if let Err(e) = self.link.close().await {
            warn!(port = %port, "Failed to close link: {}", e);
        }

        let decoder = self.decoder.stats();
        info!(
            port = %port,
            bytes_read,
            frames = decoder.frames,
            rejected = decoder.rejected,
            readings,
            dropped,
            "Capture loop ended"
        );

        CaptureSummary { port, bytes_read, decoder, readings, dropped, outcome }
    }
}
