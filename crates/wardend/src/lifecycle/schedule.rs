//! Scheduling of monitoring passes.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Outcome of waiting for the next monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The interval elapsed; run a pass.
    Elapsed,
    /// The host environment changed; the node must recycle.
    Reconfigured,
    /// Monitoring was cancelled.
    Cancelled,
}

/// Source of monitoring ticks.
pub trait Ticker {
    /// Blocks until the next pass is due or monitoring is cancelled.
    fn wait(&self) -> Tick;
}

#[derive(Debug, Default)]
struct Pending {
    cancelled: bool,
    reconfigured: bool,
}

impl Pending {
    fn is_set(&self) -> bool {
        self.cancelled || self.reconfigured
    }
}

/// Cancellation flag that wakes sleeping tickers immediately.
///
/// It also carries host reconfiguration notices so they reach the monitoring
/// loop instead of acting on the node directly.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<(Mutex<Pending>, Condvar)>,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every ticker sharing this flag.
    pub fn cancel(&self) {
        self.update(|pending| pending.cancelled = true);
    }

    /// Tells the monitoring loop that the host environment changed.
    pub fn reconfigure(&self) {
        self.update(|pending| pending.reconfigured = true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(PoisonError::into_inner).cancelled
    }

    /// Sleeps for `timeout` unless woken first. Cancellation wins over a
    /// pending reconfiguration.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Tick {
        let (lock, condvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |pending| !pending.is_set())
            .unwrap_or_else(PoisonError::into_inner);
        if guard.cancelled {
            Tick::Cancelled
        } else if guard.reconfigured {
            Tick::Reconfigured
        } else {
            Tick::Elapsed
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Pending)) {
        let (lock, condvar) = &*self.inner;
        apply(&mut lock.lock().unwrap_or_else(PoisonError::into_inner));
        condvar.notify_all();
    }
}

/// Ticker firing at a fixed interval until cancelled.
#[derive(Debug, Clone)]
pub struct IntervalTicker {
    interval: Duration,
    cancellation: Cancellation,
}

impl IntervalTicker {
    #[must_use]
    pub fn new(interval: Duration, cancellation: Cancellation) -> Self {
        Self {
            interval,
            cancellation,
        }
    }
}

impl Ticker for IntervalTicker {
    fn wait(&self) -> Tick {
        self.cancellation.wait_timeout(self.interval)
    }
}
