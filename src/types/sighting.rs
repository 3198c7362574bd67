//! Finalized sighting records

use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use super::{PortId, TagId};

/// Summary of one closed tag session.
///
/// Emitted exactly once per session closure and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSighting {
    pub tag: TagId,
    /// Monotonic time of the first reading
    pub first_seen: Instant,
    /// Monotonic time of the last reading
    pub last_seen: Instant,
    /// Wall-clock time of the first reading
    pub first_seen_wall: SystemTime,
    pub reading_count: u32,
    /// Contributing ports, sorted
    pub ports: Vec<PortId>,
    pub mean_rssi_dbm: f64,
    pub peak_rssi_dbm: i16,
}

impl FinalizedSighting {
    /// Number of distinct ports that reported the tag
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Time between the first and last reading
    pub fn dwell(&self) -> Duration {
        self.last_seen.saturating_duration_since(self.first_seen)
    }
}
