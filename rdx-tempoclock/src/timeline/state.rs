//! A timeline of discrete state labels.

use super::event::{EventTimeline, Timed};
use crate::common::{PlaybackState, Seconds, Ticks};
use crate::error::ClockError;

/// Extra data carried by a state record that originates from a `start` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateDetails {
    /// Tick offset the span starts from.
    pub offset: Option<Ticks>,
    /// How long the span is expected to last.
    pub duration: Option<Seconds>,
}

/// A single state transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateEvent<S = PlaybackState> {
    pub time: Seconds,
    pub state: S,
    pub offset: Option<Ticks>,
    pub duration: Option<Seconds>,
}

impl<S> Timed for StateEvent<S> {
    fn time(&self) -> Seconds {
        self.time
    }
}

/// An [`EventTimeline`] of state labels with a default value that applies
/// before the first record.
#[derive(Debug, Clone)]
pub struct StateTimeline<S = PlaybackState> {
    events: EventTimeline<StateEvent<S>>,
    initial: S,
}

impl Default for StateTimeline<PlaybackState> {
    fn default() -> Self {
        Self::new(PlaybackState::Stopped)
    }
}

impl<S: Copy + PartialEq> StateTimeline<S> {
    pub fn new(initial: S) -> Self {
        Self {
            events: EventTimeline::new(),
            initial,
        }
    }

    /// Creates a timeline whose first record is `state` at time zero.
    pub(crate) fn seeded(state: S) -> Self {
        Self {
            events: EventTimeline::with_initial(StateEvent {
                time: 0.0,
                state,
                offset: None,
                duration: None,
            }),
            initial: state,
        }
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    /// The state in effect at `time`.
    pub fn get_value_at_time(&self, time: Seconds) -> S {
        self.events.get(time).map_or(self.initial, |e| e.state)
    }

    pub fn set_state_at_time(&mut self, state: S, time: Seconds) -> Result<(), ClockError> {
        self.set_state_at_time_with(state, time, StateDetails::default())
    }

    pub fn set_state_at_time_with(
        &mut self,
        state: S,
        time: Seconds,
        details: StateDetails,
    ) -> Result<(), ClockError> {
        self.events.add(StateEvent {
            time,
            state,
            offset: details.offset,
            duration: details.duration,
        })
    }

    /// The most recent record labelled `state` at or before `time`.
    pub fn get_last_state(&self, state: S, time: Seconds) -> Option<&StateEvent<S>> {
        self.last_state_index(state, time)
            .map(|i| &self.events.events()[i])
    }

    pub(crate) fn last_state_index(&self, state: S, time: Seconds) -> Option<usize> {
        let anchor = self.events.search(time)?;
        self.events.events()[..=anchor]
            .iter()
            .rposition(|e| e.state == state)
    }

    /// The first record labelled `state`, scanning forward from the record in
    /// effect at `time` (or from the start of the timeline if there is none).
    pub fn get_next_state(&self, state: S, time: Seconds) -> Option<&StateEvent<S>> {
        let anchor = self.events.search(time).unwrap_or(0);
        self.events.events()[anchor..]
            .iter()
            .find(|e| e.state == state)
    }

    /// The record in effect at `time`.
    pub fn get(&self, time: Seconds) -> Option<&StateEvent<S>> {
        self.events.get(time)
    }

    /// Drops every record at or after `time`.
    pub fn cancel(&mut self, time: Seconds) {
        self.events.cancel(time);
    }

    /// Records in `[start, end)`.
    pub fn events_between(&self, start: Seconds, end: Seconds) -> &[StateEvent<S>] {
        self.events.between(start, end)
    }

    /// Records strictly after `time`.
    pub fn events_after(&self, time: Seconds) -> &[StateEvent<S>] {
        self.events.after(time)
    }

    pub fn events(&self) -> &[StateEvent<S>] {
        self.events.events()
    }

    pub(crate) fn search(&self, time: Seconds) -> Option<usize> {
        self.events.search(time)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
