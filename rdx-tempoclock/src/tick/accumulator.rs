//! Integrates a piecewise-linear rate curve into a tick count.
//!
//! The curve is a list of breakpoints. A `Step` breakpoint holds its value
//! until the next one; a `Linear` breakpoint is reached by a straight ramp from
//! the breakpoint before it. Between two breakpoints the tick count therefore
//! grows as the area of a trapezoid, which has a closed form in both
//! directions (time to ticks and ticks to time).

use crate::common::{ensure_time, Seconds, Ticks};
use crate::config::RateUnits;
use crate::error::ClockError;
use crate::timeline::{EventTimeline, Timed};
use std::cell::Cell;

/// Smallest start value an exponential ramp will use.
const MIN_EXPONENTIAL_VALUE: f64 = 1e-7;

/// Linear segments per second used to approximate an exponential ramp.
const EXPONENTIAL_SEGMENTS_PER_SECOND: f64 = 10.0;

/// Upper bound on the segments of one target approach. The remaining gap
/// after this many time constants is below `f64` resolution.
const MAX_TARGET_SEGMENTS: usize = 1000;

/// How a breakpoint's value is reached from the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Jump to the value at the breakpoint's time.
    Step,
    /// Ramp linearly from the previous breakpoint's value.
    Linear,
}

/// A scheduled change to the rate curve, in the curve's external units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateChange {
    SetValue(f64),
    LinearRamp(f64),
    /// Approach `value` exponentially; the gap closes by a factor of `e` every
    /// `time_constant` seconds.
    TargetApproach { value: f64, time_constant: f64 },
}

/// A point on the rate curve.
#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub time: Seconds,
    /// Rate in ticks per second.
    pub value: f64,
    pub segment: Segment,
    ticks: Cell<Option<Ticks>>,
}

impl Breakpoint {
    fn new(time: Seconds, value: f64, segment: Segment) -> Self {
        Self {
            time,
            value,
            segment,
            ticks: Cell::new(None),
        }
    }

    /// Ticks elapsed from time zero up to this breakpoint, if already resolved.
    pub fn ticks(&self) -> Option<Ticks> {
        self.ticks.get()
    }
}

impl Timed for Breakpoint {
    fn time(&self) -> Seconds {
        self.time
    }
}

/// A rate curve together with its running integral.
///
/// Cumulative tick counts are memoized per breakpoint and resolved lazily;
/// scheduling a breakpoint clears the memos of every breakpoint at or after
/// it.
#[derive(Debug, Clone)]
pub struct TickAccumulator {
    events: EventTimeline<Breakpoint>,
    initial: f64,
    units: RateUnits,
}

impl TickAccumulator {
    /// Creates a curve holding `value` (in `units`) from time zero.
    pub fn new(value: f64, units: RateUnits) -> Result<Self, ClockError> {
        let initial = Self::checked_rate(units, value)?;
        let seed = Breakpoint::new(0.0, initial, Segment::Step);
        seed.ticks.set(Some(0.0));
        Ok(Self {
            events: EventTimeline::with_initial(seed),
            initial,
            units,
        })
    }

    pub fn units(&self) -> RateUnits {
        self.units
    }

    /// The rate that applies before the first breakpoint, in external units.
    pub fn initial_value(&self) -> f64 {
        self.from_internal_rate(self.initial)
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        self.events.events()
    }

    pub fn to_internal_rate(&self, value: f64) -> f64 {
        self.units.to_internal(value)
    }

    pub fn from_internal_rate(&self, value: f64) -> f64 {
        self.units.from_internal(value)
    }

    fn checked_rate(units: RateUnits, value: f64) -> Result<f64, ClockError> {
        if value.is_finite() && value >= 0.0 {
            Ok(units.to_internal(value))
        } else {
            Err(ClockError::InvalidRate(value))
        }
    }

    fn add(&mut self, time: Seconds, value: f64, segment: Segment) -> Result<(), ClockError> {
        ensure_time(time)?;
        for later in self.events.from_time(time) {
            later.ticks.set(None);
        }
        self.events.add(Breakpoint::new(time, value, segment))
    }

    // --- Scheduling ---

    /// Applies a [`RateChange`] at `time`.
    pub fn schedule(&mut self, time: Seconds, change: RateChange) -> Result<(), ClockError> {
        match change {
            RateChange::SetValue(value) => self.set_value_at_time(value, time),
            RateChange::LinearRamp(value) => self.linear_ramp_to_value_at_time(value, time),
            RateChange::TargetApproach {
                value,
                time_constant,
            } => self.set_target_at_time(value, time, time_constant),
        }
    }

    /// Jumps to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f64, time: Seconds) -> Result<(), ClockError> {
        let value = Self::checked_rate(self.units, value)?;
        self.add(time, value, Segment::Step)
    }

    /// Ramps linearly from the previous breakpoint to reach `value` at `end`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, end: Seconds) -> Result<(), ClockError> {
        let value = Self::checked_rate(self.units, value)?;
        self.add(end, value, Segment::Linear)
    }

    /// Ramps exponentially from the previous breakpoint to reach `value` at
    /// `end`, approximated by a run of linear segments.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, end: Seconds) -> Result<(), ClockError> {
        let target = Self::checked_rate(self.units, value)?;
        ensure_time(end)?;
        let (start, from) = self
            .events
            .get(end)
            .map_or((0.0, self.initial), |b| (b.time, b.value));
        let span = end - start;
        if span <= 0.0 {
            return self.add(end, target, Segment::Linear);
        }

        let from = from.max(MIN_EXPONENTIAL_VALUE);
        let ratio = target / from;
        let segments = (span * EXPONENTIAL_SEGMENTS_PER_SECOND).max(1.0).round() as usize;
        for i in 1..=segments {
            let progress = i as f64 / segments as f64;
            let time = start + span * progress;
            self.add(time, from * ratio.powf(progress), Segment::Linear)?;
        }
        Ok(())
    }

    /// Starts an exponential approach toward `value` at `time`.
    ///
    /// The curve is built from `round(max(1 / time_constant, 1))` linear
    /// segments, at most 1000, each spanning one time constant. It holds the
    /// last segment's value afterwards.
    pub fn set_target_at_time(&mut self, value: f64, time: Seconds, time_constant: f64) -> Result<(), ClockError> {
        let target = Self::checked_rate(self.units, value)?;
        if !(time_constant.is_finite() && time_constant > 0.0) {
            return Err(ClockError::InvalidTimeConstant(time_constant));
        }
        self.set_ramp_point(time)?;
        let from = self.value_at(time);
        let segments = ((1.0 / time_constant).max(1.0).round() as usize).min(MAX_TARGET_SEGMENTS);
        for i in 1..=segments {
            let elapsed = time_constant * i as f64;
            let value = target + (from - target) * (-elapsed / time_constant).exp();
            self.add(time + elapsed, value, Segment::Linear)?;
        }
        Ok(())
    }

    /// Ramps from the current value at `start` to `value` over `duration`.
    pub fn ramp_to(&mut self, value: f64, duration: Seconds, start: Seconds) -> Result<(), ClockError> {
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(ClockError::InvalidDuration(duration));
        }
        Self::checked_rate(self.units, value)?;
        self.set_ramp_point(start)?;
        self.linear_ramp_to_value_at_time(value, start + duration)
    }

    /// Pins the curve at its current value at `time`, dropping anything
    /// scheduled after it, so that a new ramp can start there.
    pub fn set_ramp_point(&mut self, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        let value = self.value_at(time);
        self.cancel_and_hold_at_time(time)?;
        self.add(time, value, Segment::Step)
    }

    /// Drops every breakpoint at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: Seconds) {
        self.events.cancel(time);
    }

    /// Drops every breakpoint after `time` while keeping the curve's value at
    /// `time` unchanged.
    pub fn cancel_and_hold_at_time(&mut self, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        let value = self.value_at(time);
        let interrupted_ramp = self
            .events
            .get_after(time)
            .is_some_and(|b| b.segment == Segment::Linear);
        self.events.cancel_after(time);

        if interrupted_ramp {
            self.add(time, value, Segment::Linear)
        } else if self.events.at_time(time).is_empty() {
            self.add(time, value, Segment::Step)
        } else {
            Ok(())
        }
    }

    // --- Queries ---

    /// The rate at `time`, in external units.
    pub fn get_value_at_time(&self, time: Seconds) -> f64 {
        self.from_internal_rate(self.value_at(time))
    }

    /// The rate at `time`, in ticks per second.
    fn value_at(&self, time: Seconds) -> f64 {
        match self.events.search(time) {
            Some(i) => {
                let before = &self.events.events()[i];
                Self::interpolate(before.time, before.value, self.events.events().get(i + 1), time)
            }
            None => Self::interpolate(0.0, self.initial, self.events.peek(), time),
        }
    }

    /// Value at `time` on the segment that starts at `(start, from)` and ends
    /// at `next`.
    fn interpolate(start: Seconds, from: f64, next: Option<&Breakpoint>, time: Seconds) -> f64 {
        match next {
            Some(next) if next.segment == Segment::Linear => {
                let span = next.time - start;
                if span <= 0.0 {
                    next.value
                } else {
                    from + (next.value - from) * ((time - start) / span).clamp(0.0, 1.0)
                }
            }
            _ => from,
        }
    }

    /// Ticks at `time`, integrating forward from breakpoint `index` (or from
    /// time zero at the initial rate).
    fn integrate(&self, index: Option<usize>, base: Ticks, time: Seconds) -> Ticks {
        let events = self.events.events();
        let (start, from, next) = match index {
            Some(i) => (events[i].time, events[i].value, events.get(i + 1)),
            None => (0.0, self.initial, events.first()),
        };
        let elapsed = time - start;
        if elapsed <= 0.0 {
            return base;
        }
        let to = Self::interpolate(start, from, next, time);
        base + 0.5 * elapsed * (from + to)
    }

    /// Resolves the memoized tick count of breakpoint `index`, filling in
    /// every unresolved breakpoint before it.
    fn resolve(&self, index: usize) -> Ticks {
        let events = self.events.events();
        if let Some(ticks) = events[index].ticks.get() {
            return ticks;
        }
        let mut first = index;
        while first > 0 && events[first].ticks.get().is_none() {
            first -= 1;
        }
        let mut ticks = match events[first].ticks.get() {
            Some(ticks) => ticks,
            None => {
                let ticks = self.integrate(None, 0.0, events[first].time);
                events[first].ticks.set(Some(ticks));
                ticks
            }
        };
        for i in first + 1..=index {
            ticks = self.integrate(Some(i - 1), ticks, events[i].time);
            events[i].ticks.set(Some(ticks));
        }
        ticks
    }

    /// Ticks elapsed between time zero and `time`.
    pub fn get_ticks_at_time(&self, time: Seconds) -> Ticks {
        let ticks = match self.events.search(time) {
            Some(i) => self.integrate(Some(i), self.resolve(i), time),
            None => self.integrate(None, 0.0, time),
        };
        ticks.max(0.0)
    }

    /// The time at which the tick count reaches `tick`, or `f64::INFINITY`
    /// if the curve never gets there.
    pub fn get_time_of_tick(&self, tick: Ticks) -> Seconds {
        let events = self.events.events();
        if !events.is_empty() {
            self.resolve(events.len() - 1);
        }
        match self.events.search_by(tick, |b| b.ticks.get().unwrap_or(0.0)) {
            Some(i) => {
                let before = &events[i];
                let base = before.ticks.get().unwrap_or(0.0);
                Self::solve(before.time, before.value, base, events.get(i + 1), tick)
            }
            None => Self::solve(0.0, self.initial, 0.0, events.first(), tick),
        }
    }

    /// Solves for the time at which the segment starting at `(start, from)`
    /// with `base` ticks reaches `tick`.
    fn solve(start: Seconds, from: f64, base: Ticks, next: Option<&Breakpoint>, tick: Ticks) -> Seconds {
        let remaining = tick - base;
        if remaining == 0.0 {
            return start;
        }
        if let Some(next) = next {
            let span = next.time - start;
            if next.segment == Segment::Linear && next.value != from && span > 0.0 {
                let slope = (next.value - from) / span;
                let root = (from * from + 2.0 * slope * remaining).max(0.0).sqrt();
                let rising = (-from + root) / slope;
                let elapsed = if rising > 0.0 { rising } else { (-from - root) / slope };
                return start + elapsed;
            }
        }
        if from == 0.0 {
            return f64::INFINITY;
        }
        start + remaining / from
    }

    /// Ticks that elapse over `duration` seconds starting at `when`.
    pub fn time_to_ticks(&self, duration: Seconds, when: Seconds) -> Ticks {
        self.get_ticks_at_time(when + duration) - self.get_ticks_at_time(when)
    }

    /// Seconds it takes for `ticks` ticks to elapse starting at `when`.
    pub fn get_duration_of_ticks(&self, ticks: Ticks, when: Seconds) -> Seconds {
        let start = self.get_ticks_at_time(when);
        self.get_time_of_tick(start + ticks) - when
    }

    pub fn ticks_to_time(&self, ticks: Ticks, when: Seconds) -> Seconds {
        self.get_duration_of_ticks(ticks, when)
    }
}
