//! crates/reading_engine_core/src/time_tracker.rs
//!
//! Accumulates active reading time as session segments.
//!
//! The tracker is a plain state machine driven by the host's lifecycle signals
//! (visible, hidden, timer tick, teardown). Every transition that ends a span of
//! active time returns the resulting [`SessionSegment`], if it is long enough to
//! keep; persisting it is up to the owner.
//!
//! ```text
//! Idle --start--> Active --hidden--> Paused --visible--> Active
//!                   |  ^                                   |
//!                   +--+ tick (checkpoint, stays Active)   |
//! Active/Paused --shutdown--> Idle <-----------------------+
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::SessionSegment;

/// Segments shorter than this are dropped.
pub const MIN_SEGMENT_SECONDS: i64 = 5;
/// How often an active session is checkpointed.
pub const FLUSH_INTERVAL_SECONDS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub min_segment: Duration,
    pub flush_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_segment: Duration::seconds(MIN_SEGMENT_SECONDS),
            flush_interval: Duration::seconds(FLUSH_INTERVAL_SECONDS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackerState {
    Idle,
    Active { started_at: DateTime<Utc> },
    Paused,
}

#[derive(Debug, Clone)]
pub struct ReadingTimeTracker {
    state: TrackerState,
    config: TrackerConfig,
    enabled: bool,
    visible: bool,
}

impl Default for ReadingTimeTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl ReadingTimeTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            state: TrackerState::Idle,
            config,
            enabled: true,
            visible: true,
        }
    }

    /// Sets the reader's tracking preference before the session starts.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// The host drives [`Self::on_tick`] every `config().flush_interval`.
    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Starts a session once content has loaded. With tracking disabled or the
    /// host hidden, the session starts paused.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.state != TrackerState::Idle {
            return;
        }
        self.state = if self.can_run() {
            TrackerState::Active { started_at: now }
        } else {
            TrackerState::Paused
        };
    }

    /// The host lost foreground visibility.
    pub fn on_hidden(&mut self, now: DateTime<Utc>) -> Option<SessionSegment> {
        self.visible = false;
        self.pause(now)
    }

    /// The host regained foreground visibility.
    pub fn on_visible(&mut self, now: DateTime<Utc>) {
        self.visible = true;
        self.resume(now);
    }

    /// Periodic checkpoint. Flushes the running span and immediately re-arms it,
    /// so reading continues uninterrupted.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> Option<SessionSegment> {
        match self.state {
            TrackerState::Active { started_at } => {
                self.state = TrackerState::Active { started_at: now };
                self.segment(started_at, now)
            }
            _ => None,
        }
    }

    /// Turns tracking on or off. Turning it off flushes and pauses.
    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) -> Option<SessionSegment> {
        self.enabled = enabled;
        if enabled {
            self.resume(now);
            None
        } else {
            self.pause(now)
        }
    }

    /// Teardown or imminent unload: final flush, then back to idle.
    pub fn shutdown(&mut self, now: DateTime<Utc>) -> Option<SessionSegment> {
        let segment = match self.state {
            TrackerState::Active { started_at } => self.segment(started_at, now),
            _ => None,
        };
        self.state = TrackerState::Idle;
        segment
    }

    fn can_run(&self) -> bool {
        self.enabled && self.visible
    }

    fn pause(&mut self, now: DateTime<Utc>) -> Option<SessionSegment> {
        match self.state {
            TrackerState::Active { started_at } => {
                self.state = TrackerState::Paused;
                self.segment(started_at, now)
            }
            _ => None,
        }
    }

    fn resume(&mut self, now: DateTime<Utc>) {
        if self.state == TrackerState::Paused && self.can_run() {
            self.state = TrackerState::Active { started_at: now };
        }
    }

    fn segment(&self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Option<SessionSegment> {
        let elapsed = ended_at - started_at;
        if elapsed < self.config.min_segment {
            return None;
        }
        Some(SessionSegment {
            started_at,
            ended_at,
            duration_seconds: elapsed.num_seconds(),
        })
    }
}
