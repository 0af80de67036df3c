//! The engine that owns a set of clocks and keeps them pulsed.

use crate::clock::{Clock, ClockOptions};
use crate::common::{ClockId, Seconds};
use crate::config::EngineConfig;
use crate::error::ClockError;
use crate::events::SystemEvent;
use crate::time::{MonotonicTime, PeriodicDriver, Ticker, TimeSource};
use parking_lot::Mutex;
use slotmap::SlotMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, trace};

/// The main tempoclock engine.
///
/// This struct is the central point of control. It holds the configuration and
/// the shared time source, owns every registered [`Clock`], and fans each
/// driver pulse out to all of them. The engine is designed to be cloned and
/// shared across tasks; every clone is a handle to the same set of clocks.
#[derive(Clone)]
pub struct TempoEngine {
    config: Arc<EngineConfig>,
    time: Arc<dyn TimeSource>,
    clocks: Arc<Mutex<SlotMap<ClockId, Clock>>>,
    system_event_sender: broadcast::Sender<SystemEvent>,
}

// Core implementation block for internal logic.
impl TempoEngine {
    /// Creates an engine that reads the system's monotonic clock.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_time_source(config, Arc::new(MonotonicTime::new()))
    }

    /// Creates an engine that reads `time` instead of the system clock.
    pub fn with_time_source(config: EngineConfig, time: Arc<dyn TimeSource>) -> Self {
        let (system_event_sender, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            time,
            clocks: Arc::new(Mutex::new(SlotMap::with_key())),
            system_event_sender,
        }
    }

    #[doc(hidden)]
    fn report_fault(&self, id: ClockId, err: &ClockError) {
        let message = match err {
            ClockError::Callback { source, .. } => format!("{err}: {source:#}"),
            _ => err.to_string(),
        };
        error!("Clock {:?} failed during pulse: {}", id, message);
        self.system_event_sender
            .send(SystemEvent::PulseFault { id, message })
            .ok();
    }
}

// Public API implementation block.
impl TempoEngine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The engine's time source reading, without lookahead.
    pub fn now(&self) -> Seconds {
        self.time.now()
    }

    /// Returns a receiver for engine-level events.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Options for a new clock, derived from the engine configuration.
    pub fn clock_options(&self) -> ClockOptions {
        ClockOptions::from_config(&self.config)
    }

    /// Creates and registers a clock that calls `callback` on every tick.
    ///
    /// The clock starts out stopped; use [`with_clock`](Self::with_clock) to
    /// schedule its transport.
    pub fn create_clock(
        &self,
        callback: impl FnMut(Seconds, u64) -> anyhow::Result<()> + Send + 'static,
    ) -> Result<ClockId, ClockError> {
        let clock = Clock::with_callback(self.time.clone(), self.clock_options(), callback)?;
        Ok(self.insert_clock(clock))
    }

    /// Registers an existing clock.
    pub fn insert_clock(&self, clock: Clock) -> ClockId {
        let id = self.clocks.lock().insert(clock);
        info!("Clock {:?} added.", id);
        self.system_event_sender
            .send(SystemEvent::ClockAdded { id })
            .ok();
        id
    }

    /// Unregisters a clock and hands it back.
    pub fn remove_clock(&self, id: ClockId) -> Option<Clock> {
        let clock = self.clocks.lock().remove(id)?;
        info!("Clock {:?} removed.", id);
        self.system_event_sender
            .send(SystemEvent::ClockRemoved { id })
            .ok();
        Some(clock)
    }

    /// Runs `f` against a registered clock. Returns `None` for unknown ids.
    pub fn with_clock<R>(&self, id: ClockId, f: impl FnOnce(&mut Clock) -> R) -> Option<R> {
        self.clocks.lock().get_mut(id).map(f)
    }

    pub fn clock_count(&self) -> usize {
        self.clocks.lock().len()
    }

    /// Pulses every registered clock once.
    ///
    /// A failing clock does not prevent the others from being pulsed. Each
    /// failure is logged and broadcast as [`SystemEvent::PulseFault`]; the
    /// first one is returned.
    pub fn pulse(&self) -> Result<(), ClockError> {
        let mut clocks = self.clocks.lock();
        trace!("Pulsing {} clocks.", clocks.len());
        let mut first_error = None;
        for (id, clock) in clocks.iter_mut() {
            if let Err(err) = clock.pulse() {
                self.report_fault(id, &err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Hands `driver` a callback that pulses this engine, at the update
    /// interval implied by the configured latency.
    pub fn attach(&self, driver: &mut impl PeriodicDriver) {
        driver.set_interval(self.config.latency.update_interval());
        let engine = self.clone();
        driver.start(Box::new(move || {
            // Faults are already logged and broadcast.
            let _ = engine.pulse();
        }));
    }

    /// Runs the engine until a shutdown signal (Ctrl+C) is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for the shutdown signal: {}", err);
            }
        })
        .await
    }

    /// Runs the engine, pulsing from a [`Ticker`], until `shutdown` resolves.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        info!("TempoEngine starting up...");
        let mut ticker = Ticker::default();
        self.attach(&mut ticker);
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: tokio::time::Instant::now(),
            })
            .ok();
        info!(
            "Engine running with {:?} latency, pulsing every {:?}.",
            self.config.latency,
            ticker.interval()
        );

        shutdown.await;

        info!("Shutdown signal received. Stopping the pulse driver...");
        ticker.stop();
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("TempoEngine has shut down.");
        Ok(())
    }
}
