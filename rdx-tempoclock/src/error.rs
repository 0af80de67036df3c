//! Error types for the tempoclock engine.

use thiserror::Error;

/// Errors raised by timelines, the tick machinery and the engine.
///
/// Invariant violations are reported synchronously by the call that would have
/// broken them, and nothing is recorded when one is returned. Queries that have
/// no finite answer (such as the time of a tick under a zero rate) are not
/// errors; they return `f64::INFINITY`.
#[derive(Error, Debug)]
pub enum ClockError {
    #[error("time must be finite and non-negative, got {0}")]
    InvalidTime(f64),

    #[error("duration must be finite and non-negative, got {0}")]
    InvalidDuration(f64),

    #[error("time {time} is earlier than the last scheduled time {last} on an increasing-only timeline")]
    NonMonotonic { time: f64, last: f64 },

    #[error("cannot stop at {0}: the clock was not started at or before that time")]
    StopBeforeStart(f64),

    #[error("rate must be finite and non-negative, got {0}")]
    InvalidRate(f64),

    #[error("time constant must be finite and positive, got {0}")]
    InvalidTimeConstant(f64),

    /// A user tick callback returned an error. Ticks that were not yet
    /// delivered in the failing window are not retried.
    #[error("tick callback failed at {time}")]
    Callback {
        time: f64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load configuration")]
    Config(#[from] ::config::ConfigError),
}
