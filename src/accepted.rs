//! Accepted-request accounting
//!
//! Tracks how many requests the throttle let through: a lifetime total for
//! `/healthz`, and a per-interval count that feeds the periodic summary log.
//! The interval count is read and zeroed under the interval lock, and the
//! summary is emitted before that lock is released, so each interval is
//! reported at most once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

/// Default spacing between summary log lines
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// One closed reporting interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalReport {
    /// Requests accepted during the interval
    pub accepted: u64,
    /// Length of the interval
    pub elapsed: Duration,
}

impl IntervalReport {
    /// Observed accepted rate over the interval
    pub fn accepted_qps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.accepted as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
pub struct AcceptedStats {
    total: AtomicU64,
    interval_count: AtomicU64,
    interval_start: Mutex<Instant>,
    report_interval: Duration,
}

impl AcceptedStats {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            total: AtomicU64::new(0),
            interval_count: AtomicU64::new(0),
            interval_start: Mutex::new(Instant::now()),
            report_interval,
        }
    }

    /// Count one accepted request; if the interval has elapsed, hand its
    /// report to `emit` and start a new interval.
    ///
    /// Returns whether a report was emitted.
    pub fn record_accept<F>(&self, emit: F) -> bool
    where
        F: FnOnce(&IntervalReport),
    {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.interval_count.fetch_add(1, Ordering::AcqRel);
        self.report_if_due(Instant::now(), emit)
    }

    /// Close the interval if at least `report_interval` has passed by `now`.
    ///
    /// Never blocks: if another thread is already reporting, this returns
    /// `false` immediately.
    pub fn report_if_due<F>(&self, now: Instant, emit: F) -> bool
    where
        F: FnOnce(&IntervalReport),
    {
        let mut start = match self.interval_start.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };

        let elapsed = now.saturating_duration_since(*start);
        if elapsed < self.report_interval {
            return false;
        }

        let report = IntervalReport {
            accepted: self.interval_count.swap(0, Ordering::AcqRel),
            elapsed,
        };
        *start = now;
        emit(&report);
        true
    }

    /// Accepted requests since startup
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Accepted requests in the current reporting interval
    pub fn interval_count(&self) -> u64 {
        self.interval_count.load(Ordering::Acquire)
    }

    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }
}

impl Default for AcceptedStats {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}
