//! Tag session tracking
//!
//! Folds readings from every port into per-tag sessions and closes them into
//! [`FinalizedSighting`]s. Each tag is in one of three states:
//!
//! ```text
//! UNSEEN --reading--> ACTIVE --finalize--> EXCLUDED --expiry--> UNSEEN
//! ```
//!
//! - a reading for an `EXCLUDED` tag is dropped
//! - a reading for an `UNSEEN` tag opens a session
//! - a reading for an `ACTIVE` tag updates its session
//!
//! Both maps sit behind one mutex. Every operation holds it only for map
//! mutation; sink calls and logging of emitted sightings happen outside.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::trace;

use crate::config::{FinalizationPolicy, PipelineConfig};
use crate::types::{FinalizedSighting, PortId, TagId, TagReading};

/// What [`TagSessionTracker::record`] did with a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First reading of a tag; a session was opened
    Opened,
    /// Reading folded into the tag's live session
    Updated,
    /// Tag is inside its exclusion window; reading dropped
    Excluded,
}

/// Tracker counters and map sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub live_sessions: usize,
    pub excluded_tags: usize,
    pub readings_accepted: u64,
    pub readings_suppressed: u64,
    pub sightings_finalized: u64,
    /// Sessions closed with fewer than `min_readings` readings
    pub sessions_discarded: u64,
}

#[derive(Debug)]
struct TagSession {
    first_seen: Instant,
    last_seen: Instant,
    first_seen_wall: SystemTime,
    count: u32,
    rssi_sum: i64,
    rssi_peak: i16,
    ports: BTreeSet<PortId>,
}

impl TagSession {
    fn open(reading: &TagReading) -> Self {
        let dbm = reading.rssi.dbm();
        Self {
            first_seen: reading.captured.instant,
            last_seen: reading.captured.instant,
            first_seen_wall: reading.captured.wall,
            count: 1,
            rssi_sum: dbm as i64,
            rssi_peak: dbm,
            ports: BTreeSet::from([reading.port.clone()]),
        }
    }

    fn absorb(&mut self, reading: &TagReading) {
        // Readings from different ports are not ordered relative to each other
        let at = reading.captured.instant;
        if at < self.first_seen {
            self.first_seen = at;
            self.first_seen_wall = reading.captured.wall;
        }
        self.last_seen = self.last_seen.max(at);

        let dbm = reading.rssi.dbm();
        self.count = self.count.saturating_add(1);
        self.rssi_sum += dbm as i64;
        self.rssi_peak = self.rssi_peak.max(dbm);
        self.ports.insert(reading.port.clone());
    }

    fn finalize(self, tag: TagId) -> FinalizedSighting {
        FinalizedSighting {
            tag,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            first_seen_wall: self.first_seen_wall,
            reading_count: self.count,
            ports: self.ports.into_iter().collect(),
            mean_rssi_dbm: self.rssi_sum as f64 / self.count as f64,
            peak_rssi_dbm: self.rssi_peak,
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    live: HashMap<TagId, TagSession>,
    excluded: HashMap<TagId, Instant>,
    /// Capture time of the newest accepted reading, for the quiet-period policy
    last_accepted: Option<Instant>,
    readings_accepted: u64,
    readings_suppressed: u64,
    sightings_finalized: u64,
    sessions_discarded: u64,
}

impl TrackerState {
    fn eligible(&self, policy: FinalizationPolicy, now: Instant) -> Vec<TagId> {
        let threshold = policy.threshold();
        let mut tags: Vec<(&TagId, Instant)> = match policy {
            FinalizationPolicy::IdleTimeout { .. } => self
                .live
                .iter()
                .filter(|(_, s)| now.saturating_duration_since(s.last_seen) > threshold)
                .map(|(tag, s)| (tag, s.first_seen))
                .collect(),
            FinalizationPolicy::QuietPeriod { .. } => match self.last_accepted {
                Some(last) if now.saturating_duration_since(last) > threshold => {
                    self.live.iter().map(|(tag, s)| (tag, s.first_seen)).collect()
                }
                _ => Vec::new(),
            },
        };

        tags.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        tags.into_iter().map(|(tag, _)| tag.clone()).collect()
    }

    fn close(
        &mut self,
        tags: Vec<TagId>,
        now: Instant,
        exclusion: Duration,
        min_readings: u32,
    ) -> Vec<FinalizedSighting> {
        let mut sightings = Vec::with_capacity(tags.len());
        for tag in tags {
            let Some(session) = self.live.remove(&tag) else { continue };

            if session.count < min_readings {
                trace!(tag = %tag, count = session.count, "Discarding short session");
                self.sessions_discarded += 1;
                continue;
            }

            if !exclusion.is_zero() {
                self.excluded.insert(tag.clone(), now + exclusion);
            }
            self.sightings_finalized += 1;
            sightings.push(session.finalize(tag));
        }
        sightings
    }
}

/// Shared session state for all ports.
///
/// All methods take `&self`; share the tracker with `Arc`.
#[derive(Debug)]
pub struct TagSessionTracker {
    state: Mutex<TrackerState>,
    policy: FinalizationPolicy,
    exclusion: Duration,
    min_readings: u32,
}

impl TagSessionTracker {
    pub fn new(policy: FinalizationPolicy, exclusion: Duration) -> Self {
        Self { state: Mutex::new(TrackerState::default()), policy, exclusion, min_readings: 1 }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.policy, config.exclusion()).with_min_readings(config.min_readings)
    }

    /// Require at least `min_readings` readings for a session to produce a sighting.
    pub fn with_min_readings(mut self, min_readings: u32) -> Self {
        self.min_readings = min_readings.max(1);
        self
    }

    pub fn policy(&self) -> FinalizationPolicy {
        self.policy
    }

    pub fn exclusion(&self) -> Duration {
        self.exclusion
    }

    /// Fold one reading into the tracker.
    ///
    /// An exclusion entry that has already expired but was not purged yet is
    /// removed here, so suppression never outlasts its window.
    pub fn record(&self, reading: &TagReading) -> RecordOutcome {
        let at = reading.captured.instant;
        let mut state = self.state.lock();

        if let Some(&expiry) = state.excluded.get(&reading.tag) {
            if at < expiry {
                state.readings_suppressed += 1;
                return RecordOutcome::Excluded;
            }
            state.excluded.remove(&reading.tag);
        }

        state.readings_accepted += 1;
        state.last_accepted = Some(state.last_accepted.map_or(at, |last| last.max(at)));

        match state.live.entry(reading.tag.clone()) {
            Entry::Occupied(mut session) => {
                session.get_mut().absorb(reading);
                RecordOutcome::Updated
            }
            Entry::Vacant(slot) => {
                slot.insert(TagSession::open(reading));
                RecordOutcome::Opened
            }
        }
    }

    /// Tags whose sessions may be closed at `now`, in ascending first-seen order.
    pub fn eligible(&self, now: Instant) -> Vec<TagId> {
        self.state.lock().eligible(self.policy, now)
    }

    /// Close every eligible session in one critical section.
    ///
    /// Each closed session becomes a sighting (unless it is below
    /// `min_readings`) and its tag enters the exclusion window ending at
    /// `now + exclusion`. Sightings are returned in ascending first-seen order.
    pub fn finalize_eligible(&self, now: Instant) -> Vec<FinalizedSighting> {
        let mut state = self.state.lock();
        let tags = state.eligible(self.policy, now);
        state.close(tags, now, self.exclusion, self.min_readings)
    }

    /// Close every live session regardless of policy (shutdown flush).
    pub fn flush_all(&self, now: Instant) -> Vec<FinalizedSighting> {
        let mut state = self.state.lock();
        let mut tags: Vec<(TagId, Instant)> =
            state.live.iter().map(|(tag, s)| (tag.clone(), s.first_seen)).collect();
        tags.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let tags = tags.into_iter().map(|(tag, _)| tag).collect();
        state.close(tags, now, self.exclusion, self.min_readings)
    }

    /// Drop exclusion entries that expired at or before `now`.
    pub fn purge_expired_exclusions(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.excluded.len();
        state.excluded.retain(|_, expiry| *expiry > now);
        before - state.excluded.len()
    }

    pub fn is_live(&self, tag: &TagId) -> bool {
        self.state.lock().live.contains_key(tag)
    }

    /// Whether readings of `tag` captured at `now` would be dropped
    pub fn is_excluded(&self, tag: &TagId, now: Instant) -> bool {
        self.state.lock().excluded.get(tag).is_some_and(|expiry| now < *expiry)
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        TrackerStats {
            live_sessions: state.live.len(),
            excluded_tags: state.excluded.len(),
            readings_accepted: state.readings_accepted,
            readings_suppressed: state.readings_suppressed,
            sightings_finalized: state.sightings_finalized,
            sessions_discarded: state.sessions_discarded,
        }
    }
}
