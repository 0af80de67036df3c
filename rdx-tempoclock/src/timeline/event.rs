//! A sorted store of time-stamped records.

use crate::common::{ensure_time, Seconds};
use crate::error::ClockError;

/// Anything that can be placed on a timeline.
pub trait Timed {
    /// The time, in seconds, at which the record takes effect.
    fn time(&self) -> Seconds;
}

/// A generic, time-ordered store of records.
///
/// Records are kept sorted by [`Timed::time`], non-decreasing. Records that
/// share a timestamp keep their insertion order, and every lookup that lands
/// on a run of equal times resolves to the last record of that run.
#[derive(Debug, Clone)]
pub struct EventTimeline<T> {
    events: Vec<T>,
    memory: Option<usize>,
    increasing: bool,
}

impl<T> Default for EventTimeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventTimeline<T> {
    /// Creates an empty, unbounded timeline.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            memory: None,
            increasing: false,
        }
    }

    /// Creates a timeline that evicts its oldest records once it holds more
    /// than `memory` of them.
    pub fn with_memory(memory: usize) -> Self {
        Self {
            memory: Some(memory),
            ..Self::new()
        }
    }

    /// Switches the timeline to increasing-only mode: every new record must
    /// be at or after the last one, and is appended without a search.
    pub fn increasing(mut self) -> Self {
        self.increasing = true;
        self
    }

    /// Seeds a timeline with a record that is known to be valid.
    pub(crate) fn with_initial(event: T) -> Self {
        Self {
            events: vec![event],
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All records, in time order.
    pub fn events(&self) -> &[T] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.events.iter()
    }

    /// The earliest record.
    pub fn peek(&self) -> Option<&T> {
        self.events.first()
    }

    /// Removes and returns the earliest record.
    pub fn shift(&mut self) -> Option<T> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.events.last()
    }

    /// The record stored immediately before `index`.
    pub fn previous(&self, index: usize) -> Option<&T> {
        index.checked_sub(1).and_then(|i| self.events.get(i))
    }

    /// Removes the first record matching `predicate`.
    pub fn remove_first(&mut self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let index = self.events.iter().position(predicate)?;
        Some(self.events.remove(index))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Binary search over an arbitrary non-decreasing key. Returns the index
    /// of the last record whose key is `<= value`.
    ///
    /// When the probe lands inside a run of equal keys it scans forward to the
    /// end of the run, so ties always resolve to the most recently inserted
    /// record.
    pub(crate) fn search_by(&self, value: f64, key: impl Fn(&T) -> f64) -> Option<usize> {
        let len = self.events.len();
        let last = self.events.last()?;
        if key(last) <= value {
            return Some(len - 1);
        }
        let mut beginning = 0;
        let mut end = len;
        while beginning < end {
            let mid = beginning + (end - beginning) / 2;
            let probe = key(&self.events[mid]);
            if probe == value {
                let mut index = mid;
                while index + 1 < len && key(&self.events[index + 1]) == value {
                    index += 1;
                }
                return Some(index);
            } else if probe < value {
                // The last record is known to be > value, so mid + 1 exists.
                if key(&self.events[mid + 1]) > value {
                    return Some(mid);
                }
                beginning = mid + 1;
            } else {
                end = mid;
            }
        }
        None
    }
}

impl<T: Timed> EventTimeline<T> {
    /// Inserts a record, keeping the timeline sorted.
    ///
    /// Fails if the record's time is negative or not finite, or, in
    /// increasing-only mode, if it is earlier than the last record.
    pub fn add(&mut self, event: T) -> Result<(), ClockError> {
        let time = event.time();
        ensure_time(time)?;
        if self.increasing {
            if let Some(last) = self.events.last() {
                if time < last.time() {
                    return Err(ClockError::NonMonotonic {
                        time,
                        last: last.time(),
                    });
                }
            }
            self.events.push(event);
        } else {
            let index = self.search(time).map_or(0, |i| i + 1);
            self.events.insert(index, event);
        }
        if let Some(memory) = self.memory {
            if self.events.len() > memory {
                let excess = self.events.len() - memory;
                self.events.drain(..excess);
            }
        }
        Ok(())
    }

    /// Index of the last record at or before `time`.
    pub(crate) fn search(&self, time: Seconds) -> Option<usize> {
        self.search_by(time, T::time)
    }

    /// Index of the first record at or after `time`.
    fn lower_bound(&self, time: Seconds) -> usize {
        self.events.partition_point(|e| e.time() < time)
    }

    /// Index one past the last record at or before `time`.
    fn upper_bound(&self, time: Seconds) -> usize {
        self.search(time).map_or(0, |i| i + 1)
    }

    /// The closest record at or before `time`.
    pub fn get(&self, time: Seconds) -> Option<&T> {
        self.search(time).map(|i| &self.events[i])
    }

    /// Like [`get`](Self::get), but searching on another non-decreasing key.
    pub fn get_by(&self, value: f64, key: impl Fn(&T) -> f64) -> Option<&T> {
        self.search_by(value, key).map(|i| &self.events[i])
    }

    /// The last record strictly before `time`.
    pub fn get_before(&self, time: Seconds) -> Option<&T> {
        self.lower_bound(time)
            .checked_sub(1)
            .map(|i| &self.events[i])
    }

    /// The first record strictly after `time`.
    pub fn get_after(&self, time: Seconds) -> Option<&T> {
        self.events.get(self.upper_bound(time))
    }

    /// The record following the last one whose `key` is `<= value`.
    pub fn get_after_by(&self, value: f64, key: impl Fn(&T) -> f64) -> Option<&T> {
        let index = self.search_by(value, key).map_or(0, |i| i + 1);
        self.events.get(index)
    }

    /// Drops every record at or after `after`.
    pub fn cancel(&mut self, after: Seconds) {
        let index = self.lower_bound(after);
        self.events.truncate(index);
    }

    /// Drops every record strictly after `time`.
    pub fn cancel_after(&mut self, time: Seconds) {
        let index = self.upper_bound(time);
        self.events.truncate(index);
    }

    /// Drops every record at or before `time`.
    pub fn cancel_before(&mut self, time: Seconds) {
        let index = self.upper_bound(time);
        self.events.drain(..index);
    }

    /// Records at or before `time`.
    pub fn before(&self, time: Seconds) -> &[T] {
        &self.events[..self.upper_bound(time)]
    }

    /// Records strictly after `time`.
    pub fn after(&self, time: Seconds) -> &[T] {
        &self.events[self.upper_bound(time)..]
    }

    /// Records at or after `time`.
    pub fn from_time(&self, time: Seconds) -> &[T] {
        &self.events[self.lower_bound(time)..]
    }

    /// Records in the half-open range `[start, end)`.
    pub fn between(&self, start: Seconds, end: Seconds) -> &[T] {
        let lower = self.lower_bound(start);
        let upper = self.lower_bound(end);
        if lower < upper {
            &self.events[lower..upper]
        } else {
            &[]
        }
    }

    /// Records exactly at `time`.
    pub fn at_time(&self, time: Seconds) -> &[T] {
        let lower = self.lower_bound(time);
        let upper = self.upper_bound(time);
        if lower < upper {
            &self.events[lower..upper]
        } else {
            &[]
        }
    }

    pub fn for_each(&self, callback: impl FnMut(&T)) {
        self.events.iter().for_each(callback);
    }

    /// Visits every record at or before `time`.
    pub fn for_each_before(&self, time: Seconds, callback: impl FnMut(&T)) {
        self.before(time).iter().for_each(callback);
    }

    /// Visits every record strictly after `time`.
    pub fn for_each_after(&self, time: Seconds, callback: impl FnMut(&T)) {
        self.after(time).iter().for_each(callback);
    }

    /// Visits every record at or after `time`.
    pub fn for_each_from(&self, time: Seconds, callback: impl FnMut(&T)) {
        self.from_time(time).iter().for_each(callback);
    }

    /// Visits every record in `[start, end)`.
    pub fn for_each_between(&self, start: Seconds, end: Seconds, callback: impl FnMut(&T)) {
        self.between(start, end).iter().for_each(callback);
    }

    /// Visits every record exactly at `time`.
    pub fn for_each_at_time(&self, time: Seconds, callback: impl FnMut(&T)) {
        self.at_time(time).iter().for_each(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Mark {
        time: f64,
        id: usize,
    }

    impl Timed for Mark {
        fn time(&self) -> f64 {
            self.time
        }
    }

    fn mark(time: f64, id: usize) -> Mark {
        Mark { time, id }
    }

    fn timeline_of(times: &[f64]) -> EventTimeline<Mark> {
        let mut timeline = EventTimeline::new();
        for (id, &time) in times.iter().enumerate() {
            timeline.add(mark(time, id)).unwrap();
        }
        timeline
    }

    fn ids(events: &[Mark]) -> Vec<usize> {
        events.iter().map(|e| e.id).collect()
    }

    #[test]
    fn keeps_records_sorted() {
        let timeline = timeline_of(&[3.0, 1.0, 2.0, 0.5]);
        let times: Vec<f64> = timeline.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.5, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let timeline = timeline_of(&[1.0, 2.0, 1.0, 1.0, 0.0]);
        assert_eq!(ids(timeline.events()), vec![4, 0, 2, 3, 1]);
        assert_eq!(timeline.get(1.0).map(|e| e.id), Some(3));
        assert_eq!(timeline.get(1.5).map(|e| e.id), Some(3));
    }

    #[test]
    fn rejects_negative_and_nan_times() {
        let mut timeline = EventTimeline::new();
        assert!(matches!(
            timeline.add(mark(-1.0, 0)),
            Err(ClockError::InvalidTime(_))
        ));
        assert!(timeline.add(mark(f64::NAN, 1)).is_err());
        assert!(timeline.is_empty());
    }

    #[test]
    fn increasing_mode_appends_and_rejects_earlier_times() {
        let mut timeline = EventTimeline::new().increasing();
        timeline.add(mark(1.0, 0)).unwrap();
        timeline.add(mark(1.0, 1)).unwrap();
        timeline.add(mark(2.0, 2)).unwrap();
        let err = timeline.add(mark(1.5, 3)).unwrap_err();
        assert!(matches!(err, ClockError::NonMonotonic { time, last } if time == 1.5 && last == 2.0));
        assert_eq!(ids(timeline.events()), vec![0, 1, 2]);
    }

    #[test]
    fn neighbours_are_strict() {
        let timeline = timeline_of(&[1.0, 2.0, 3.0]);
        assert_eq!(timeline.get_before(2.0).map(|e| e.id), Some(0));
        assert_eq!(timeline.get_after(2.0).map(|e| e.id), Some(2));
        assert!(timeline.get_before(1.0).is_none());
        assert!(timeline.get_after(3.0).is_none());
        assert!(timeline.get(0.5).is_none());
    }

    #[test]
    fn memory_bound_evicts_oldest() {
        let mut timeline = EventTimeline::with_memory(3);
        for id in 0..5 {
            timeline.add(mark(id as f64, id)).unwrap();
        }
        assert_eq!(ids(timeline.events()), vec![2, 3, 4]);
    }

    #[test]
    fn cancel_drops_records_at_and_after_cutoff() {
        let mut timeline = timeline_of(&[0.0, 1.0, 1.0, 2.0, 3.0]);
        timeline.cancel(1.0);
        assert_eq!(ids(timeline.events()), vec![0]);
        timeline.cancel(0.0);
        assert!(timeline.is_empty());
    }

    #[test]
    fn cancel_before_drops_records_at_and_before_time() {
        let mut timeline = timeline_of(&[0.0, 1.0, 1.0, 2.0]);
        timeline.cancel_before(1.0);
        assert_eq!(ids(timeline.events()), vec![3]);
    }

    #[test]
    fn iteration_bounds() {
        let timeline = timeline_of(&[0.0, 1.0, 1.0, 2.0, 3.0]);
        let mut seen = Vec::new();
        timeline.for_each_between(1.0, 3.0, |e| seen.push(e.id));
        assert_eq!(seen, vec![1, 2, 3]);

        seen.clear();
        timeline.for_each_from(1.0, |e| seen.push(e.id));
        assert_eq!(seen, vec![1, 2, 3, 4]);

        seen.clear();
        timeline.for_each_after(1.0, |e| seen.push(e.id));
        assert_eq!(seen, vec![3, 4]);

        seen.clear();
        timeline.for_each_before(1.0, |e| seen.push(e.id));
        assert_eq!(seen, vec![0, 1, 2]);

        seen.clear();
        timeline.for_each_at_time(1.0, |e| seen.push(e.id));
        assert_eq!(seen, vec![1, 2]);

        assert!(timeline.between(2.0, 2.0).is_empty());
        assert!(timeline.between(3.0, 1.0).is_empty());
    }

    #[test]
    fn peek_shift_and_remove() {
        let mut timeline = timeline_of(&[2.0, 1.0]);
        assert_eq!(timeline.peek().map(|e| e.id), Some(1));
        assert_eq!(timeline.shift().map(|e| e.id), Some(1));
        assert_eq!(timeline.remove_first(|e| e.id == 0).map(|e| e.time), Some(2.0));
        assert!(timeline.shift().is_none());
    }

    #[test]
    fn search_by_alternate_key() {
        let timeline = timeline_of(&[0.0, 1.0, 2.0]);
        // key = id * 10, monotone along the timeline
        let found = timeline.get_by(15.0, |e| e.id as f64 * 10.0);
        assert_eq!(found.map(|e| e.id), Some(1));
        let next = timeline.get_after_by(15.0, |e| e.id as f64 * 10.0);
        assert_eq!(next.map(|e| e.id), Some(2));
    }

    proptest! {
        #[test]
        fn queries_match_naive_model(
            raw in prop::collection::vec(0u8..20, 0..60),
            query in 0u8..22,
            upper in 0u8..22,
        ) {
            let times: Vec<f64> = raw.iter().map(|&t| f64::from(t) * 0.5).collect();
            let timeline = timeline_of(&times);
            let q = f64::from(query) * 0.5;
            let e = f64::from(upper) * 0.5;

            // Stable sort reproduces the insertion-order tie break.
            let mut model: Vec<Mark> = times.iter().enumerate().map(|(id, &t)| mark(t, id)).collect();
            model.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap());

            let expected_get = model.iter().filter(|m| m.time <= q).last().map(|m| m.id);
            prop_assert_eq!(timeline.get(q).map(|m| m.id), expected_get);

            let expected_between: Vec<usize> = model
                .iter()
                .filter(|m| m.time >= q && m.time < e)
                .map(|m| m.id)
                .collect();
            prop_assert_eq!(ids(timeline.between(q, e)), expected_between);

            let mut cancelled = timeline.clone();
            cancelled.cancel(q);
            let expected_cancel: Vec<usize> = model.iter().filter(|m| m.time < q).map(|m| m.id).collect();
            prop_assert_eq!(ids(cancelled.events()), expected_cancel);
        }
    }
}
