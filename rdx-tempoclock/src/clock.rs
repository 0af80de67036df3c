//! The pulse-driven clock that turns a tick source into callbacks.

use crate::common::{ensure_time, ListenerId, PlaybackState, Seconds, Ticks};
use crate::components::emitter::Emitter;
use crate::config::{ClockConfig, EngineConfig, RateUnits};
use crate::error::ClockError;
use crate::events::{ClockEvent, ClockEventKind};
use crate::tick::{TickAccumulator, TickSource};
use crate::time::TimeSource;
use crate::timeline::{StateDetails, StateTimeline};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, Span};

/// Invoked once per tick boundary with the boundary's time and tick index.
pub type TickCallback = Box<dyn FnMut(Seconds, u64) -> anyhow::Result<()> + Send>;

/// Construction parameters for a [`Clock`].
#[derive(Debug, Clone)]
pub struct ClockOptions {
    /// Initial rate, in `units`.
    pub frequency: f64,
    pub units: RateUnits,
    /// Seconds added to the time source when the clock computes "now".
    pub lookahead: Seconds,
    /// Log state transitions at `debug` level.
    pub debug: bool,
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            units: RateUnits::Hertz,
            lookahead: 0.0,
            debug: false,
        }
    }
}

impl ClockOptions {
    /// Options for a clock created by an engine running with `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let ClockConfig {
            frequency,
            units,
            debug,
        } = config.clock.clone();
        Self {
            frequency,
            units,
            lookahead: config.latency.lookahead(),
            debug,
        }
    }
}

/// A clock that fires a callback on every tick boundary.
///
/// Nothing happens on its own: each call to [`pulse`](Clock::pulse) handles
/// the span of time since the previous pulse, replaying any start, stop or
/// pause that fell inside it and firing the tick callback for every boundary
/// crossed. Irregular or late pulses therefore never lose ticks.
pub struct Clock {
    tick_source: TickSource,
    state: StateTimeline,
    last_update: Seconds,
    callback: Option<TickCallback>,
    emitter: Emitter<ClockEvent>,
    time: Arc<dyn TimeSource>,
    lookahead: Seconds,
    span: Span,
    debug: bool,
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("state", &self.state.events())
            .field("last_update", &self.last_update)
            .field("lookahead", &self.lookahead)
            .field("listeners", &self.emitter.len())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl Clock {
    pub fn new(time: Arc<dyn TimeSource>, options: ClockOptions) -> Result<Self, ClockError> {
        let rate = TickAccumulator::new(options.frequency, options.units)?;
        Ok(Self {
            tick_source: TickSource::with_rate(rate),
            state: StateTimeline::seeded(PlaybackState::Stopped),
            last_update: 0.0,
            callback: None,
            emitter: Emitter::new(),
            time,
            lookahead: options.lookahead.max(0.0),
            span: tracing::debug_span!("clock"),
            debug: options.debug,
        })
    }

    /// Creates a clock that calls `callback` on every tick.
    pub fn with_callback(
        time: Arc<dyn TimeSource>,
        options: ClockOptions,
        callback: impl FnMut(Seconds, u64) -> anyhow::Result<()> + Send + 'static,
    ) -> Result<Self, ClockError> {
        let mut clock = Self::new(time, options)?;
        clock.set_callback(callback);
        Ok(clock)
    }

    /// Replaces the span that this clock's log records are parented to.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn set_callback(&mut self, callback: impl FnMut(Seconds, u64) -> anyhow::Result<()> + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// The time source reading plus the lookahead.
    pub fn now(&self) -> Seconds {
        self.time.now() + self.lookahead
    }

    pub fn lookahead(&self) -> Seconds {
        self.lookahead
    }

    /// The end of the window handled by the most recent pulse.
    pub fn last_pulse_time(&self) -> Seconds {
        self.last_update
    }

    pub fn rate(&self) -> &TickAccumulator {
        self.tick_source.rate()
    }

    pub fn rate_mut(&mut self) -> &mut TickAccumulator {
        self.tick_source.rate_mut()
    }

    // --- Lifecycle subscriptions ---

    pub fn on(&mut self, kind: ClockEventKind, handler: impl FnMut(&ClockEvent) + Send + 'static) -> ListenerId {
        self.emitter.on(kind, handler)
    }

    pub fn on_any(&mut self, handler: impl FnMut(&ClockEvent) + Send + 'static) -> ListenerId {
        self.emitter.on_any(handler)
    }

    pub fn once(&mut self, kind: ClockEventKind, handler: impl FnMut(&ClockEvent) + Send + 'static) -> ListenerId {
        self.emitter.once(kind, handler)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    // --- Transport ---

    /// Starts the clock at `time`, optionally from `offset` ticks.
    ///
    /// Does nothing if the clock is already started at `time`. A start
    /// scheduled before the last pulse is announced immediately.
    pub fn start(&mut self, time: Seconds, offset: Option<Ticks>) -> Result<(), ClockError> {
        ensure_time(time)?;
        if self.state.get_value_at_time(time) == PlaybackState::Started {
            return Ok(());
        }
        let details = StateDetails {
            offset,
            duration: None,
        };
        self.state
            .set_state_at_time_with(PlaybackState::Started, time, details)?;
        self.tick_source.start(time, offset)?;
        if self.debug {
            debug!(parent: &self.span, time, ?offset, "Clock started.");
        }
        if time < self.last_update {
            let offset = self.tick_source.get_ticks_at_time(time);
            announce(&mut self.emitter, &self.span, self.debug, ClockEvent::Started { time, offset });
        }
        Ok(())
    }

    /// Stops the clock at `time`, rewinding its tick count to zero.
    ///
    /// Fails if the clock was never started at or before `time`; does nothing
    /// if it is already stopped at `time`.
    pub fn stop(&mut self, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        if self.state.get_last_state(PlaybackState::Started, time).is_none() {
            return Err(ClockError::StopBeforeStart(time));
        }
        if self.state.get_value_at_time(time) == PlaybackState::Stopped {
            return Ok(());
        }
        self.state.cancel(time);
        self.state.set_state_at_time(PlaybackState::Stopped, time)?;
        self.tick_source.stop(time)?;
        if self.debug {
            debug!(parent: &self.span, time, "Clock stopped.");
        }
        if time < self.last_update {
            announce(&mut self.emitter, &self.span, self.debug, ClockEvent::Stopped { time });
        }
        Ok(())
    }

    /// Pauses the clock at `time`, keeping its tick count. Only a started
    /// clock can be paused.
    pub fn pause(&mut self, time: Seconds) -> Result<(), ClockError> {
        ensure_time(time)?;
        if self.state.get_value_at_time(time) != PlaybackState::Started {
            return Ok(());
        }
        self.state.set_state_at_time(PlaybackState::Paused, time)?;
        self.tick_source.pause(time)?;
        if self.debug {
            debug!(parent: &self.span, time, "Clock paused.");
        }
        if time < self.last_update {
            announce(&mut self.emitter, &self.span, self.debug, ClockEvent::Paused { time });
        }
        Ok(())
    }

    // --- Queries ---

    pub fn state(&self) -> PlaybackState {
        self.get_state_at_time(self.now())
    }

    pub fn get_state_at_time(&self, time: Seconds) -> PlaybackState {
        self.state.get_value_at_time(time)
    }

    pub fn set_ticks_at_time(&mut self, ticks: Ticks, time: Seconds) -> Result<(), ClockError> {
        self.tick_source.set_ticks_at_time(ticks, time)
    }

    pub fn get_ticks_at_time(&self, time: Seconds) -> Ticks {
        self.tick_source.get_ticks_at_time(time)
    }

    pub fn get_seconds_at_time(&self, time: Seconds) -> Seconds {
        self.tick_source.get_seconds_at_time(time)
    }

    /// The time at which the count reaches `tick`, measured from the
    /// transition in effect at `before` (default: now).
    pub fn get_time_of_tick(&self, tick: Ticks, before: Option<Seconds>) -> Seconds {
        let before = before.unwrap_or_else(|| self.now());
        self.tick_source.get_time_of_tick(tick, before)
    }

    /// The time of the tick `offset` ticks after the count at `when`.
    pub fn next_tick_time(&self, offset: Ticks, when: Seconds) -> Seconds {
        let current = self.tick_source.get_ticks_at_time(when);
        self.tick_source.get_time_of_tick(current + offset, when)
    }

    /// The current tick, rounded up.
    pub fn ticks(&self) -> u64 {
        self.get_ticks_at_time(self.now()).ceil().max(0.0) as u64
    }

    pub fn set_ticks(&mut self, ticks: Ticks) -> Result<(), ClockError> {
        let now = self.now();
        self.tick_source.set_ticks_at_time(ticks, now)
    }

    /// Seconds of running time at the current moment.
    pub fn seconds(&self) -> Seconds {
        self.get_seconds_at_time(self.now())
    }

    pub fn set_seconds(&mut self, seconds: Seconds) -> Result<(), ClockError> {
        let now = self.now();
        self.tick_source.set_seconds_at_time(seconds, now)
    }

    // --- Pulse ---

    /// Processes everything between the previous pulse and now.
    ///
    /// Transitions and tick callbacks are delivered in time order. If the
    /// tick callback fails, the remaining ticks of this window are dropped
    /// while its remaining transitions are still announced, and the error is
    /// returned. The next pulse carries on from the new window.
    pub fn pulse(&mut self) -> Result<(), ClockError> {
        let start = self.last_update;
        let end = self.now();
        self.last_update = end;
        if end <= start {
            return Ok(());
        }
        trace!(parent: &self.span, start, end, "Pulse.");

        let Clock {
            tick_source,
            state,
            callback,
            emitter,
            span,
            debug,
            ..
        } = self;

        // After a callback fault no more ticks are fired in this window, but
        // every transition in it is still announced.
        let mut failure = None;
        let mut cursor = start;
        for record in state.events_between(start, end) {
            if failure.is_none() {
                failure = dispatch(tick_source, callback, cursor, record.time).err();
            }
            let event = match record.state {
                PlaybackState::Started => Some(ClockEvent::Started {
                    time: record.time,
                    offset: tick_source.get_ticks_at_time(record.time),
                }),
                PlaybackState::Stopped if record.time == 0.0 => None,
                PlaybackState::Stopped => Some(ClockEvent::Stopped { time: record.time }),
                PlaybackState::Paused => Some(ClockEvent::Paused { time: record.time }),
            };
            if let Some(event) = event {
                announce(emitter, span, *debug, event);
            }
            cursor = record.time;
        }
        match failure {
            Some(err) => Err(err),
            None => dispatch(tick_source, callback, cursor, end),
        }
    }
}

fn dispatch(
    tick_source: &TickSource,
    callback: &mut Option<TickCallback>,
    start: Seconds,
    end: Seconds,
) -> Result<(), ClockError> {
    match callback.as_mut() {
        Some(callback) => tick_source.for_each_tick_between(start, end, callback.as_mut()),
        None => Ok(()),
    }
}

fn announce(emitter: &mut Emitter<ClockEvent>, span: &Span, debug: bool, event: ClockEvent) {
    let listeners = emitter.emit(&event);
    if debug {
        debug!(parent: span, ?event, listeners, "Clock event emitted.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTime;
    use anyhow::anyhow;
    use std::sync::Mutex;

    fn manual_clock(frequency: f64) -> (ManualTime, Clock) {
        let time = ManualTime::default();
        let options = ClockOptions {
            frequency,
            ..ClockOptions::default()
        };
        let clock = Clock::new(Arc::new(time.clone()), options).unwrap();
        (time, clock)
    }

    /// Records ticks and lifecycle events in one ordered log.
    fn logged_clock(frequency: f64) -> (ManualTime, Clock, Arc<Mutex<Vec<String>>>) {
        let (time, mut clock) = manual_clock(frequency);
        let log = Arc::new(Mutex::new(Vec::new()));
        let ticks = log.clone();
        clock.set_callback(move |_, tick| {
            ticks.lock().unwrap().push(format!("tick {tick}"));
            Ok(())
        });
        let events = log.clone();
        clock.on_any(move |event| {
            let line = match event {
                ClockEvent::Started { time, .. } => format!("start {time}"),
                ClockEvent::Stopped { time } => format!("stop {time}"),
                ClockEvent::Paused { time } => format!("pause {time}"),
            };
            events.lock().unwrap().push(line);
        });
        (time, clock, log)
    }

    #[test]
    fn irregular_pulses_catch_up() {
        let (time, mut clock) = manual_clock(2.0);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        clock.set_callback(move |t, tick| {
            sink.lock().unwrap().push((t, tick));
            Ok(())
        });
        clock.start(0.0, None).unwrap();

        for now in [0.0, 0.3, 1.2] {
            time.set(now);
            clock.pulse().unwrap();
        }
        assert_eq!(*fired.lock().unwrap(), vec![(0.0, 0), (0.5, 1), (1.0, 2)]);
    }

    #[test]
    fn events_and_ticks_interleave_in_time_order() {
        let (time, mut clock, log) = logged_clock(2.0);
        clock.start(0.5, None).unwrap();
        clock.pause(1.5).unwrap();
        clock.start(1.8, None).unwrap();
        clock.stop(2.5).unwrap();

        time.set(3.0);
        clock.pulse().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start 0.5", "tick 0", "tick 1", "pause 1.5", "start 1.8", "tick 2", "tick 3",
                "stop 2.5",
            ]
        );
    }

    #[test]
    fn start_event_carries_offset() {
        let (time, mut clock) = manual_clock(1.0);
        let starts = Arc::new(Mutex::new(Vec::new()));
        let sink = starts.clone();
        clock.on(ClockEventKind::Start, move |event| {
            sink.lock().unwrap().push(*event);
        });
        clock.start(1.0, Some(8.0)).unwrap();
        time.set(2.0);
        clock.pulse().unwrap();
        assert_eq!(
            *starts.lock().unwrap(),
            vec![ClockEvent::Started {
                time: 1.0,
                offset: 8.0
            }]
        );
        assert_eq!(clock.get_ticks_at_time(2.0), 9.0);
    }

    #[test]
    fn transitions_are_idempotent() {
        let (_, mut clock) = manual_clock(1.0);
        clock.pause(1.0).unwrap();
        assert_eq!(clock.get_state_at_time(1.0), PlaybackState::Stopped);

        clock.start(1.0, None).unwrap();
        clock.start(2.0, None).unwrap();
        assert_eq!(clock.get_ticks_at_time(3.0), 2.0);

        clock.stop(4.0).unwrap();
        clock.stop(5.0).unwrap();
        assert_eq!(clock.get_state_at_time(6.0), PlaybackState::Stopped);
        assert_eq!(clock.get_ticks_at_time(6.0), 0.0);
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let (_, mut clock) = manual_clock(1.0);
        assert!(matches!(clock.stop(1.0), Err(ClockError::StopBeforeStart(t)) if t == 1.0));
        clock.start(2.0, None).unwrap();
        assert!(matches!(clock.stop(1.0), Err(ClockError::StopBeforeStart(_))));
        assert!(clock.stop(3.0).is_ok());
    }

    #[test]
    fn negative_times_are_rejected() {
        let (_, mut clock) = manual_clock(1.0);
        assert!(matches!(clock.start(-1.0, None), Err(ClockError::InvalidTime(_))));
        assert_eq!(clock.get_state_at_time(0.0), PlaybackState::Stopped);
    }

    #[test]
    fn past_transitions_emit_immediately() {
        let (time, mut clock, log) = logged_clock(1.0);
        time.set(2.0);
        clock.pulse().unwrap();
        assert!(log.lock().unwrap().is_empty());

        clock.start(1.0, None).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["start 1"]);

        // ticks before the previous pulse are not replayed
        time.set(3.5);
        clock.pulse().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["start 1", "tick 1", "tick 2"]);
    }

    #[test]
    fn callback_fault_skips_rest_of_window() {
        let (time, mut clock) = manual_clock(2.0);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        clock.set_callback(move |_, tick| {
            if tick == 1 {
                return Err(anyhow!("tick {tick} rejected"));
            }
            sink.lock().unwrap().push(tick);
            Ok(())
        });
        clock.start(0.0, None).unwrap();

        time.set(1.2);
        let err = clock.pulse().unwrap_err();
        assert!(matches!(err, ClockError::Callback { time, .. } if time == 0.5));
        assert_eq!(clock.last_pulse_time(), 1.2);

        time.set(2.0);
        clock.pulse().unwrap();
        assert_eq!(*fired.lock().unwrap(), vec![0, 3]);
    }

    #[test]
    fn callback_fault_still_announces_later_transitions() {
        let (time, mut clock) = manual_clock(2.0);
        clock.set_callback(|_, tick| {
            if tick == 1 {
                return Err(anyhow!("tick {tick} rejected"));
            }
            Ok(())
        });
        let stops = Arc::new(Mutex::new(Vec::new()));
        let sink = stops.clone();
        clock.on(ClockEventKind::Stop, move |event| {
            sink.lock().unwrap().push(event.time());
        });
        clock.start(0.0, None).unwrap();
        clock.stop(1.0).unwrap();

        time.set(2.0);
        assert!(matches!(clock.pulse(), Err(ClockError::Callback { time, .. }) if time == 0.5));
        time.set(3.0);
        clock.pulse().unwrap();
        assert_eq!(*stops.lock().unwrap(), vec![1.0]);
        assert_eq!(clock.get_state_at_time(2.5), PlaybackState::Stopped);
    }

    #[test]
    fn pulse_just_past_a_boundary_fires_each_tick_once() {
        let (time, mut clock) = manual_clock(2.0);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        clock.set_callback(move |t, tick| {
            sink.lock().unwrap().push((t, tick));
            Ok(())
        });
        clock.start(0.0, None).unwrap();

        for now in [0.0, 0.500_000_1, 1.2] {
            time.set(now);
            clock.pulse().unwrap();
        }
        let fired = fired.lock().unwrap();
        let ticks: Vec<u64> = fired.iter().map(|&(_, tick)| tick).collect();
        assert_eq!(ticks, vec![0, 1, 2]);
        for (&(t, _), expected) in fired.iter().zip([0.0, 0.5, 1.0]) {
            assert!((t - expected).abs() < 1e-9, "tick at {t}, expected {expected}");
        }
    }

    #[test]
    fn pulse_on_a_boundary_defers_it_to_the_next_window() {
        let (time, mut clock, log) = logged_clock(2.0);
        clock.start(0.0, None).unwrap();
        for now in [0.5, 1.0, 1.2] {
            time.set(now);
            clock.pulse().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["start 0", "tick 0", "tick 1", "tick 2"]);
    }

    #[test]
    fn lookahead_shifts_now() {
        let time = ManualTime::new(1.0);
        let options = ClockOptions {
            lookahead: 0.25,
            ..ClockOptions::default()
        };
        let clock = Clock::new(Arc::new(time), options).unwrap();
        assert_eq!(clock.now(), 1.25);
    }

    #[test]
    fn tick_and_seconds_accessors() {
        let (time, mut clock) = manual_clock(4.0);
        clock.start(0.0, None).unwrap();
        time.set(1.1);
        assert_eq!(clock.ticks(), 5);
        assert!((clock.seconds() - 1.1).abs() < 1e-9);
        assert_eq!(clock.state(), PlaybackState::Started);

        clock.set_ticks(100.0).unwrap();
        time.set(1.6);
        assert!((clock.get_ticks_at_time(1.6) - 102.0).abs() < 1e-9);
        assert!((clock.next_tick_time(2.0, 1.6) - 2.1).abs() < 1e-9);
        assert!((clock.get_time_of_tick(104.0, None) - 2.1).abs() < 1e-9);
    }
}
