//! Tick accounting: the rate curve and the transport built on top of it.

pub mod accumulator;
pub mod source;

pub use accumulator::{Breakpoint, RateChange, Segment, TickAccumulator};
pub use source::{Measure, TickAnchor, TickSource};
