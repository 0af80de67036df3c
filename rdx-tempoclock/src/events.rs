//! Defines all public event types produced by the tempoclock engine.
//!
//! Clock lifecycle events are delivered synchronously through each clock's
//! [`Emitter`](crate::components::emitter::Emitter). Engine-level events are
//! broadcast on a `tokio::sync::broadcast` channel.

use crate::common::{ClockId, Seconds, Ticks};
use crate::components::emitter::EventKind;
use tokio::time::Instant;

/// A transport transition, reported when a pulse reaches its time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    /// The clock started at `time`, with its tick count at `offset`.
    Started { time: Seconds, offset: Ticks },
    Stopped { time: Seconds },
    Paused { time: Seconds },
}

impl ClockEvent {
    pub fn time(&self) -> Seconds {
        match self {
            ClockEvent::Started { time, .. }
            | ClockEvent::Stopped { time }
            | ClockEvent::Paused { time } => *time,
        }
    }
}

/// The kinds of [`ClockEvent`] a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockEventKind {
    Start,
    Stop,
    Pause,
}

impl EventKind for ClockEvent {
    type Kind = ClockEventKind;

    fn kind(&self) -> ClockEventKind {
        match self {
            ClockEvent::Started { .. } => ClockEventKind::Start,
            ClockEvent::Stopped { .. } => ClockEventKind::Stop,
            ClockEvent::Paused { .. } => ClockEventKind::Pause,
        }
    }
}

/// Events related to the lifecycle and state of the engine itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the engine's run loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the engine's run loop is about to exit.
    EngineShutdown,
    /// Fired when a clock is registered with the engine.
    ClockAdded { id: ClockId },
    /// Fired when a clock is removed from the engine.
    ClockRemoved { id: ClockId },
    /// Fired when a clock's tick callback fails during a pulse.
    PulseFault { id: ClockId, message: String },
}
