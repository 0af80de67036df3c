//! Defines all configuration structures for the tempoclock engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, with `TEMPOCLOCK__*` environment
//! variables layered on top through the `config` crate. Every field has a
//! default, so an empty file (or no file at all) is a valid configuration.

use crate::error::ClockError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The top-level configuration for the `TempoEngine`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// How far ahead of wall time the engine schedules work.
    #[serde(default)]
    pub latency: LatencyHint,

    /// Defaults applied to clocks created through the engine.
    #[serde(default)]
    pub clock: ClockConfig,
}

impl EngineConfig {
    /// Loads a configuration from an optional file, then applies any
    /// `TEMPOCLOCK__SECTION__KEY` environment overrides.
    ///
    /// A missing file is not an error; the defaults are used instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClockError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(::config::Environment::with_prefix("TEMPOCLOCK").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Trades responsiveness against robustness to scheduling jitter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyHint {
    /// 100 ms of lookahead. Suitable for live input.
    #[default]
    Interactive,
    /// 250 ms of lookahead.
    Balanced,
    /// 500 ms of lookahead. Suitable for sustained, non-interactive playback.
    Playback,
    /// A user-defined lookahead in seconds.
    Custom { lookahead: f64 },
}

impl LatencyHint {
    /// Seconds added to the time source when a clock asks for "now".
    pub fn lookahead(&self) -> f64 {
        match self {
            LatencyHint::Interactive => 0.1,
            LatencyHint::Balanced => 0.25,
            LatencyHint::Playback => 0.5,
            LatencyHint::Custom { lookahead } => lookahead.max(0.0),
        }
    }

    /// How often the periodic driver should pulse: half the lookahead.
    pub fn update_interval(&self) -> Duration {
        let secs = self.lookahead() / 2.0;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::from_millis(50)
        }
    }
}

/// Per-clock defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Initial rate, expressed in `units`.
    #[serde(default = "default_frequency")]
    pub frequency: f64,

    #[serde(default)]
    pub units: RateUnits,

    /// Emit `debug!` records for state transitions.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            units: RateUnits::default(),
            debug: false,
        }
    }
}

/// The externally visible unit of a rate curve. Internally every curve is
/// integrated in ticks per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RateUnits {
    /// Ticks per second.
    #[default]
    Hertz,
    /// Beats per minute, with `ppq` ticks per beat.
    Bpm {
        #[serde(default = "default_ppq")]
        ppq: u32,
    },
}

impl RateUnits {
    /// Converts an external rate into ticks per second.
    pub fn to_internal(&self, value: f64) -> f64 {
        match self {
            RateUnits::Hertz => value,
            RateUnits::Bpm { ppq } => value / 60.0 * f64::from(*ppq),
        }
    }

    /// Converts ticks per second back into the external unit.
    pub fn from_internal(&self, value: f64) -> f64 {
        match self {
            RateUnits::Hertz => value,
            RateUnits::Bpm { ppq } if *ppq > 0 => value * 60.0 / f64::from(*ppq),
            RateUnits::Bpm { .. } => 0.0,
        }
    }
}

// --- Default value functions for serde ---

fn default_frequency() -> f64 {
    1.0
}

fn default_ppq() -> u32 {
    192
}
