//! Decoded tag-read notifications

use std::time::SystemTime;
use tokio::time::Instant;

use super::{PortId, Rssi, TagId};

/// Timestamp assigned when a frame is decoded.
///
/// The monotonic instant drives all session timing; the wall-clock time is
/// carried only so sinks can label records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime {
    pub instant: Instant,
    pub wall: SystemTime,
}

impl CaptureTime {
    pub fn now() -> Self {
        Self { instant: Instant::now(), wall: SystemTime::now() }
    }
}

/// One tag detection from one port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReading {
    pub tag: TagId,
    pub rssi: Rssi,
    pub port: PortId,
    pub captured: CaptureTime,
}

impl TagReading {
    /// Monotonic capture instant
    pub fn captured_at(&self) -> Instant {
        self.captured.instant
    }
}
