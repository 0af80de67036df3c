//! Time sources and the periodic drivers that pulse clocks.
//!
//! Clocks never read the system time directly. They ask an injected
//! [`TimeSource`], which is either the real monotonic clock or a
//! [`ManualTime`] that tests and offline renders move by hand. Likewise the
//! pulse cadence comes from a [`PeriodicDriver`]: a [`Ticker`] task on the
//! tokio runtime, or a [`ManualDriver`] that fires only when told to.

use crate::common::Seconds;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, trace};

/// Default pulse interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Supplies monotonic wall-clock seconds.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Seconds;
}

/// Seconds elapsed since the source was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Seconds {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A settable time source. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    bits: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new(start: Seconds) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, time: Seconds) {
        self.bits.store(time.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: Seconds) {
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + seconds).to_bits())
            });
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Seconds {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// The zero-argument callback a driver invokes on every pulse.
pub type PulseCallback = Box<dyn FnMut() + Send>;

/// Repeatedly invokes a callback at an adjustable interval.
///
/// A driver never overlaps pulses: the next one is only scheduled once the
/// previous callback has returned.
pub trait PeriodicDriver {
    /// Begins pulsing, replacing any callback that was already running.
    fn start(&mut self, callback: PulseCallback);

    fn interval(&self) -> Duration;

    /// Changes the interval. Takes effect from the next pulse, even while
    /// running.
    fn set_interval(&mut self, interval: Duration);

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// A [`PeriodicDriver`] backed by a task on the tokio runtime.
pub struct Ticker {
    interval: watch::Sender<Duration>,
    shutdown: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        let (interval, _) = watch::channel(interval);
        Self {
            interval,
            shutdown: None,
            task: None,
        }
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("interval", &self.interval())
            .field("running", &self.is_running())
            .finish()
    }
}

impl PeriodicDriver for Ticker {
    /// Spawns the pulse task. Must be called from within a tokio runtime;
    /// otherwise an error is logged and nothing is started.
    fn start(&mut self, mut callback: PulseCallback) {
        self.stop();
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                error!("Ticker cannot start outside a tokio runtime: {}", err);
                return;
            }
        };

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let mut interval_rx = self.interval.subscribe();
        let task = handle.spawn(async move {
            let mut period = *interval_rx.borrow_and_update();
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        period = *interval_rx.borrow_and_update();
                        trace!(?period, "Ticker interval changed.");
                    }
                    _ = tokio::time::sleep(period) => callback(),
                }
            }
            trace!("Ticker task exiting.");
        });
        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
    }

    fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    fn set_interval(&mut self, interval: Duration) {
        self.interval.send_replace(interval);
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
        self.task = None;
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A [`PeriodicDriver`] that only pulses when asked. Used for tests and
/// faster-than-real-time rendering with [`ManualTime`].
pub struct ManualDriver {
    callback: Option<PulseCallback>,
    interval: Duration,
}

impl ManualDriver {
    pub fn new(interval: Duration) -> Self {
        Self {
            callback: None,
            interval,
        }
    }

    /// Fires the callback once. Returns `false` if the driver is stopped.
    pub fn pulse(&mut self) -> bool {
        match self.callback.as_mut() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Moves `time` forward by `duration` in interval-sized steps, pulsing
    /// after each full step. Returns the number of pulses fired.
    pub fn advance(&mut self, time: &ManualTime, duration: Duration) -> usize {
        let mut pulses = 0;
        if self.interval.is_zero() {
            time.advance(duration.as_secs_f64());
            return usize::from(self.pulse());
        }
        let mut remaining = duration;
        while remaining >= self.interval {
            time.advance(self.interval.as_secs_f64());
            remaining -= self.interval;
            if self.pulse() {
                pulses += 1;
            }
        }
        if !remaining.is_zero() {
            time.advance(remaining.as_secs_f64());
        }
        pulses
    }
}

impl Default for ManualDriver {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl fmt::Debug for ManualDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualDriver")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl PeriodicDriver for ManualDriver {
    fn start(&mut self, callback: PulseCallback) {
        self.callback = Some(callback);
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    fn stop(&mut self) {
        self.callback = None;
    }

    fn is_running(&self) -> bool {
        self.callback.is_some()
    }
}
