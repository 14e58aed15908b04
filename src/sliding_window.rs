//! Sliding Window Counter
//!
//! Counts events over the trailing window with millisecond resolution.
//!
//! The window is tiled by one bucket per millisecond, stored in a circular
//! array indexed by `timestamp_ms mod N`. `start_ms` is the timestamp of the
//! oldest bucket still inside the window, so the live range is
//! `[start_ms, start_ms + N)`. Advancing the window clears every bucket that
//! falls out of that range and subtracts it from the running `sum`, which
//! keeps `sum == Σ buckets` after every call.
//!
//! The counter itself is not synchronized; `QpsThrottler` owns it behind a
//! mutex.

use std::time::Duration;

use crate::config_validator::ConfigValidator;
use crate::errors::BusygateResult;

/// Width of a single bucket
pub const BUCKET_SIZE: Duration = Duration::from_millis(1);

/// Upper bound on the window, keeps the bucket array at a sane size
pub const MAX_WINDOW_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    window: Duration,
    window_secs: f64,
    buckets: Vec<u64>,
    start_ms: i64,
    sum: u64,
}

impl SlidingWindowCounter {
    /// Create an empty counter whose window begins at `start_ms`
    ///
    /// Fails if the window is shorter than one bucket.
    pub fn new(window: Duration, start_ms: i64) -> BusygateResult<Self> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let mut v = ConfigValidator::new();
        v.validate_duration_ms("window_ms", window_ms, 1, MAX_WINDOW_MS);
        v.finish()?;

        Ok(Self {
            window,
            window_secs: window.as_secs_f64(),
            buckets: vec![0; window_ms as usize],
            start_ms,
            sum: 0,
        })
    }

    /// Advance to `now_ms`, count one event there, and return the rate
    pub fn record_and_rate(&mut self, now_ms: i64) -> f64 {
        self.advance(now_ms);
        let idx = self.index(now_ms);
        self.buckets[idx] += 1;
        self.sum += 1;
        self.rate()
    }

    /// Advance to `now_ms` and return the rate without counting anything
    pub fn current_rate(&mut self, now_ms: i64) -> f64 {
        self.advance(now_ms);
        self.rate()
    }

    /// Events currently inside the window
    pub fn sum(&self) -> u64 {
        self.sum
    }

    /// Number of one-millisecond buckets (`N`)
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Timestamp of the oldest bucket inside the window
    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    fn rate(&self) -> f64 {
        self.sum as f64 / self.window_secs
    }

    /// Expire every bucket older than `now_ms - N + 1`.
    ///
    /// A backwards clock leaves the window untouched.
    fn advance(&mut self, now_ms: i64) {
        let n = self.buckets.len() as i64;
        let oldest_valid_ms = now_ms - n + 1;

        // More than a full window of idle time: nothing survives.
        if self.start_ms < oldest_valid_ms - n {
            self.buckets.fill(0);
            self.sum = 0;
            self.start_ms = oldest_valid_ms;
            return;
        }

        while self.start_ms < oldest_valid_ms {
            let idx = self.index(self.start_ms);
            let expired = std::mem::take(&mut self.buckets[idx]);
            debug_assert!(expired <= self.sum, "window sum would go negative");
            self.sum -= expired;
            self.start_ms += 1;
        }
    }

    fn index(&self, timestamp_ms: i64) -> usize {
        timestamp_ms.rem_euclid(self.buckets.len() as i64) as usize
    }

    #[cfg(test)]
    pub(crate) fn bucket_total(&self) -> u64 {
        self.buckets.iter().sum()
    }
}
