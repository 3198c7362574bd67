//! Test utilities for building reader byte streams and scripted links
//!
//! Shared by unit tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::link::Link;
use crate::protocol::{CMD_TAG_READ, Frame, FrameType};
use crate::types::{CaptureTime, PortId, Rssi, TagId, TagReading};
use crate::{IngestError, Result};

/// Wire bytes of a tag-read notice with the given raw RSSI and EPC.
pub fn tag_notice_bytes(rssi_raw: u8, epc: [u8; 12]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(17);
    payload.push(rssi_raw);
    payload.extend_from_slice(&[0x30, 0x00]); // PC word
    payload.extend_from_slice(&epc);
    payload.extend_from_slice(&[0x12, 0x34]); // tag CRC
    Frame::validated(FrameType::Notice, CMD_TAG_READ, payload.into()).encode().to_vec()
}

/// EPC whose last byte is `n`, for generating distinct tags
pub fn epc(n: u8) -> [u8; 12] {
    [0xE2, 0x00, 0x00, 0x17, 0x22, 0x0A, 0x01, 0x23, 0x45, 0x67, 0x89, n]
}

/// Flip every bit of the checksum byte of an encoded frame.
pub fn corrupt_checksum(frame: &mut [u8]) {
    let at = frame.len() - 2;
    frame[at] ^= 0xFF;
}

/// Reading of `tag` on `port` at `at` with RSSI -56 dBm
pub fn reading_at(tag: &str, port: &str, at: Instant) -> TagReading {
    reading_with_rssi(tag, port, at, 0xC8)
}

pub fn reading_with_rssi(tag: &str, port: &str, at: Instant, rssi_raw: u8) -> TagReading {
    TagReading {
        tag: TagId::from(tag),
        rssi: Rssi::from_raw(rssi_raw),
        port: PortId::from(port),
        captured: CaptureTime { instant: at, wall: SystemTime::now() },
    }
}

/// One step of a [`ScriptedLink`]
#[derive(Debug)]
pub enum LinkStep {
    /// Deliver these bytes (split across reads if larger than the buffer)
    Bytes(Vec<u8>),
    /// Wait this long, then report a timed-out read
    Pause(Duration),
    /// Fail with an I/O error of this kind
    Fail(io::ErrorKind),
    /// Report end of stream
    End,
}

/// Link that plays back a fixed script.
///
/// After the script is exhausted it keeps reporting timed-out reads, like an
/// idle serial port.
#[derive(Debug)]
pub struct ScriptedLink {
    port: PortId,
    steps: VecDeque<LinkStep>,
    idle_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl ScriptedLink {
    pub fn new(port: &str, steps: Vec<LinkStep>) -> Self {
        Self {
            port: PortId::from(port),
            steps: steps.into(),
            idle_timeout: Duration::from_millis(50),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once the capture loop closes the link
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[async_trait::async_trait]
impl Link for ScriptedLink {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.steps.pop_front() {
            Some(LinkStep::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(LinkStep::Bytes(bytes.split_off(n)));
                }
                Ok(Some(n))
            }
            Some(LinkStep::Pause(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(Some(0))
            }
            Some(LinkStep::Fail(kind)) => {
                Err(IngestError::link_io(self.port.to_string(), io::Error::new(kind, "scripted failure")))
            }
            Some(LinkStep::End) => Ok(None),
            None => {
                tokio::time::sleep(self.idle_timeout).await;
                Ok(Some(0))
            }
        }
    }

    fn port(&self) -> &PortId {
        &self.port
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
