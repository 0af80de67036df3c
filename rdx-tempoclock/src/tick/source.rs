//! A transport over a [`TickAccumulator`]: start, stop and pause bookkeeping,
//! plus the tick boundary scan that drives callbacks.

use super::accumulator::TickAccumulator;
use crate::common::{ensure_time, PlaybackState, Seconds, Ticks};
use crate::config::RateUnits;
use crate::error::ClockError;
use crate::timeline::{EventTimeline, StateDetails, StateTimeline, Timed};
use std::iter;

/// Phase offsets closer than this to a whole tick are treated as zero.
const TICK_EPSILON: f64 = 1e-6;

/// Seconds within which a tick boundary counts as lying on a window start.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Re-roots tick accounting: from `time` on, counting resumes at `ticks`
/// (equivalently, at `seconds` of elapsed transport time).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickAnchor {
    pub time: Seconds,
    pub ticks: Ticks,
    pub seconds: Seconds,
}

impl Timed for TickAnchor {
    fn time(&self) -> Seconds {
        self.time
    }
}

/// Which quantity [`TickSource`] accumulates while started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Ticks,
    Seconds,
}

/// Tracks how many ticks have elapsed while the transport was running.
#[derive(Debug, Clone)]
pub struct TickSource {
    state: StateTimeline,
    anchors: EventTimeline<TickAnchor>,
    rate: TickAccumulator,
}

impl TickSource {
    /// Creates a stopped source ticking at `frequency` (in `units`).
    pub fn new(frequency: f64, units: RateUnits) -> Result<Self, ClockError> {
        Ok(Self::with_rate(TickAccumulator::new(frequency, units)?))
    }

    pub fn with_rate(rate: TickAccumulator) -> Self {
        Self {
            state: StateTimeline::seeded(PlaybackState::Stopped),
            anchors: EventTimeline::with_initial(TickAnchor {
                time: 0.0,
                ticks: 0.0,
                seconds: 0.0,
            }),
            rate,
        }
    }

    pub fn rate(&self) -> &TickAccumulator {
        &self.rate
    }

    pub fn rate_mut(&mut self) -> &mut TickAccumulator {
        &mut self.rate
    }

    pub fn get_state_at_time(&self, time: Seconds) -> PlaybackState {
        self.state.get_value_at_time(time)
    }

    // --- Transitions ---

    /// Starts counting at `time`, optionally from `offset` ticks.
    ///
    /// Does nothing if the source is already started at `time`.
    pub fn start(&mut self, time: Seconds, offset: Option<Ticks>) -> Result<(), ClockError> {
        ensure_time(time)?;
        if self.state.get_value_at_time(time) != PlaybackState::Started {
            let details = StateDetails {
                offset,
                duration: None,
            };
            self.state
                .set_state_at_time_with(PlaybackState::Started, time, details)?;
            if let Some(offset) = offset {
                self.set_ticks_at_time(offset, time)?;
            }
        }
        Ok(())
    }

    /// Stops at `time` and rewinds the tick count to zero.
    ///
    /// Anything scheduled at or after `time` is dropped. When `time` falls
    /// inside an already stopped span, that earlier stop is replaced.
    pub fn stop(&mut self, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        if self.state.get_value_at_time(time) == PlaybackState::Stopped {
            if let Some(previous) = self.state.get(time).map(|e| e.time) {
                if previous > 0.0 {
                    self.anchors.cancel(previous);
                    self.state.cancel(previous);
                }
            }
        }
        self.state.cancel(time);
        self.state.set_state_at_time(PlaybackState::Stopped, time)?;
        self.set_ticks_at_time(0.0, time)
    }

    /// Pauses at `time`, keeping the tick count. Only a started source can
    /// be paused.
    pub fn pause(&mut self, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        if self.state.get_value_at_time(time) == PlaybackState::Started {
            self.state.set_state_at_time(PlaybackState::Paused, time)?;
        }
        Ok(())
    }

    /// Drops every transition and anchor at or after `time`.
    pub fn cancel(&mut self, time: Seconds) {
        self.state.cancel(time);
        self.anchors.cancel(time);
    }

    // --- Anchors ---

    pub fn set_ticks_at_time(&mut self, ticks: Ticks, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        let seconds = self.rate.get_duration_of_ticks(ticks, time);
        self.anchors.cancel(time);
        self.anchors.add(TickAnchor {
            time,
            ticks,
            seconds,
        })
    }

    pub fn set_seconds_at_time(&mut self, seconds: Seconds, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        let ticks = self.rate.time_to_ticks(seconds, time);
        self.anchors.cancel(time);
        self.anchors.add(TickAnchor {
            time,
            ticks,
            seconds,
        })
    }

    // --- Queries ---

    pub fn get_ticks_at_time(&self, time: Seconds) -> Ticks {
        self.elapsed_at(time, Measure::Ticks)
    }

    pub fn get_seconds_at_time(&self, time: Seconds) -> Seconds {
        self.elapsed_at(time, Measure::Seconds)
    }

    /// Replays the transitions since the last stop, summing `measure` over
    /// every started span and restarting the sum at each anchor.
    pub fn elapsed_at(&self, time: Seconds, measure: Measure) -> f64 {
        let events = self.state.events();
        let (first, mut last_time) = match self.state.last_state_index(PlaybackState::Stopped, time) {
            Some(i) => (i, events[i].time),
            None => (0, 0.0),
        };
        let mut last_state = PlaybackState::Stopped;
        let end = self.state.search(time).map_or(first, |i| i + 1);

        let records = events[first..end]
            .iter()
            .map(|e| (e.time, e.state))
            .chain(iter::once((time, PlaybackState::Paused)));

        let mut elapsed = 0.0;
        for (at, state) in records {
            let mut period_start = last_time;
            if let Some(anchor) = self.anchors.get(at) {
                if anchor.time >= last_time {
                    elapsed = match measure {
                        Measure::Ticks => anchor.ticks,
                        Measure::Seconds => anchor.seconds,
                    };
                    period_start = anchor.time;
                }
            }
            if last_state == PlaybackState::Started && state != PlaybackState::Started {
                elapsed += match measure {
                    Measure::Ticks => {
                        self.rate.get_ticks_at_time(at) - self.rate.get_ticks_at_time(period_start)
                    }
                    Measure::Seconds => at - period_start,
                };
            }
            last_time = at;
            last_state = state;
        }
        elapsed
    }

    /// The time at which the source's count reaches `tick`, measured from
    /// the anchor and transition in effect at `before`.
    pub fn get_time_of_tick(&self, tick: Ticks, before: Seconds) -> Seconds {
        let (anchor_time, anchor_ticks) = self
            .anchors
            .get(before)
            .map_or((0.0, 0.0), |a| (a.time, a.ticks));
        let state_time = self.state.get(before).map_or(0.0, |e| e.time);
        let start = anchor_time.max(state_time);
        let absolute = self.rate.get_ticks_at_time(start) + tick - anchor_ticks;
        self.rate.get_time_of_tick(absolute)
    }

    /// Invokes `callback(time, tick)` for every tick boundary in
    /// `[start, end)` that falls inside a started span.
    ///
    /// The first callback error stops the scan. It is returned once any
    /// enclosing scan has unwound; the boundaries after it are not revisited.
    pub fn for_each_tick_between<F>(&self, start: Seconds, end: Seconds, callback: &mut F) -> Result<(), ClockError>
    where
        F: FnMut(Seconds, u64) -> anyhow::Result<()> + ?Sized,
    {
        if end <= start {
            return Ok(());
        }

        let mut last = self.state.get(start).map(|e| (e.time, e.state));
        for event in self.state.events_after(start).iter().take_while(|e| e.time < end) {
            if let Some((last_time, PlaybackState::Started)) = last {
                if event.state != PlaybackState::Started {
                    self.for_each_tick_between(last_time.max(start), event.time, callback)?;
                }
            }
            last = Some((event.time, event.state));
        }

        let Some((span_start, PlaybackState::Started)) = last else {
            return Ok(());
        };
        let from = span_start.max(start);
        let start_ticks = self.rate.get_ticks_at_time(from);
        let phase = start_ticks - self.rate.get_ticks_at_time(span_start);
        let mut offset = phase.ceil() - phase;
        if (offset - 1.0).abs() < TICK_EPSILON {
            // Only a boundary that lands on `from` belongs to this window; one
            // strictly before it was delivered by the previous one.
            let boundary = self.rate.get_time_of_tick(start_ticks - (1.0 - offset));
            if from - boundary <= BOUNDARY_EPSILON {
                offset = 0.0;
            }
        }

        let mut next = self.rate.get_time_of_tick(start_ticks + offset);
        let mut failure = None;
        while next < end {
            let tick = self.get_ticks_at_time(next).round().max(0.0) as u64;
            if let Err(source) = callback(next, tick) {
                failure = Some(ClockError::Callback { time: next, source });
                break;
            }
            let step = self.rate.get_duration_of_ticks(1.0, next);
            if !(step.is_finite() && step > 0.0) {
                break;
            }
            next += step;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
