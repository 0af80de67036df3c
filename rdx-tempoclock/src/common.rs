//! Contains common, primitive types shared by every part of the engine.
//!
//! This module defines the key types used to identify clocks, listeners and
//! intervals, the playback states a clock moves through, and the unit aliases
//! used throughout the public API. Using distinct key types keeps a handle from
//! one registry from being used to index another.

use slotmap::new_key_type;
use std::fmt;

/// Wall-clock time in seconds, as supplied by a [`TimeSource`](crate::time::TimeSource).
pub type Seconds = f64;

/// A (possibly fractional) count of logical ticks.
pub type Ticks = f64;

new_key_type! {
    /// Uniquely identifies a clock registered with a `TempoEngine`.
    ///
    /// Keys are never reused, so a stale id simply stops resolving once its
    /// clock has been removed.
    pub struct ClockId;

    /// Identifies a lifecycle listener registered on an `Emitter`.
    pub struct ListenerId;

    /// A stable handle to an interval stored in an `IntervalTree`.
    pub struct IntervalId;
}

/// The discrete states a `Clock` or `TickSource` can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Started,
    Stopped,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Started => "started",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Rejects times that cannot be scheduled: negative, NaN or infinite.
pub(crate) fn ensure_time(time: Seconds) -> Result<(), crate::error::ClockError> {
    if time.is_finite() && time >= 0.0 {
        Ok(())
    } else {
        Err(crate::error::ClockError::InvalidTime(time))
    }
}
