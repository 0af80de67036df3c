//! Contains the time-ordered stores the rest of the engine is built on.
//!
//! - [`EventTimeline`] keeps arbitrary records sorted by time.
//! - [`StateTimeline`] layers a default label over an `EventTimeline` of state
//!   transitions.
//! - [`IntervalTree`] answers "which spans cover this instant" queries in
//!   logarithmic time.

pub mod event;
pub mod interval;
pub mod state;

pub use event::{EventTimeline, Timed};
pub use interval::{IntervalEvent, IntervalTree};
pub use state::{StateDetails, StateEvent, StateTimeline};
