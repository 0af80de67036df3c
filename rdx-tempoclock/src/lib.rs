//! # Tempoclock
//!
//! A deterministic scheduling engine that fires events against a logical
//! clock whose rate varies continuously over time.
//!
//! The host only has to deliver coarse, irregular wall-clock pulses. On every
//! pulse the engine works out exactly which tick boundaries were crossed since
//! the previous one, including boundaries on an accelerating or decelerating
//! tempo curve, and fires a callback for each.
//!
//! ## Core Concepts
//!
//! - **Timelines**: [`EventTimeline`](timeline::EventTimeline),
//!   [`StateTimeline`](timeline::StateTimeline) and
//!   [`IntervalTree`](timeline::IntervalTree) store time-stamped records and
//!   answer "what applies at time t" queries.
//! - **Rate curve**: a [`TickAccumulator`](tick::TickAccumulator) integrates a
//!   piecewise curve of ticks per second, in both directions.
//! - **Transport**: a [`TickSource`](tick::TickSource) layers start, stop and
//!   pause on top of the curve, and a [`Clock`](clock::Clock) turns pulses into
//!   tick callbacks and lifecycle events.
//! - **Engine**: a [`TempoEngine`](engine::TempoEngine) owns a set of clocks and
//!   keeps them pulsed from a [`PeriodicDriver`](time::PeriodicDriver).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tempoclock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a default configuration.
//!     let config = EngineConfig::default();
//!
//!     // 2. Create the engine.
//!     let engine = TempoEngine::new(config);
//!
//!     // 3. Register a clock and schedule its transport.
//!     let id = engine.create_clock(|time, tick| {
//!         println!("tick {tick} at {time:.3}s");
//!         Ok(())
//!     })?;
//!     engine.with_clock(id, |clock| {
//!         let now = clock.now();
//!         clock.rate_mut().ramp_to(4.0, 10.0, now)?;
//!         clock.start(now, None)
//!     });
//!
//!     // 4. Run the engine. It will shut down on Ctrl+C.
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Tempo Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod clock;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod tick;
pub mod time;
pub mod timeline;

/// A prelude module for easy importing of the most common tempoclock types.
pub mod prelude {
    pub use crate::clock::{Clock, ClockOptions, TickCallback};
    pub use crate::common::{ClockId, IntervalId, ListenerId, PlaybackState, Seconds, Ticks};
    pub use crate::config::{ClockConfig, EngineConfig, LatencyHint, RateUnits};
    pub use crate::engine::TempoEngine;
    pub use crate::error::ClockError;
    pub use crate::events::{ClockEvent, ClockEventKind, SystemEvent};
    pub use crate::tick::{RateChange, TickAccumulator, TickSource};
    pub use crate::time::{ManualDriver, ManualTime, MonotonicTime, PeriodicDriver, Ticker, TimeSource};
    pub use crate::timeline::{EventTimeline, IntervalTree, StateTimeline, Timed};
}
