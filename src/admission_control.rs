//! Admission Control
//!
//! Probabilistic load shedding against a sliding-window QPS estimate.
//!
//! Every candidate request is counted in the window *before* the decision is
//! made, and stays counted when it is rejected. The window therefore measures
//! offered load `L`, and once `L` exceeds the limit each request is admitted
//! with probability `limit / L`, so the admitted rate settles at the limit
//! instead of oscillating around it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{Clock, SystemClock};
use crate::config_validator::ConfigValidator;
use crate::errors::BusygateResult;
use crate::sliding_window::SlidingWindowCounter;

/// Averaging window used when none is configured
pub const DEFAULT_WINDOW_MS: u64 = 500;

/// Throttle configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Sustained request rate above which requests start being shed
    pub limit_qps: f64,

    /// Averaging window in milliseconds
    pub window_ms: u64,
}

impl ThrottleConfig {
    pub fn new(limit_qps: f64, window: Duration) -> Self {
        Self {
            limit_qps,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit_qps: 1000.0,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissionDecision {
    /// Request may proceed
    Accepted {
        /// Window rate including this request
        qps: f64,
    },
    /// Request should be answered with 503
    Rejected {
        /// Window rate including this request
        qps: f64,
        /// Probability this request had of getting through
        accept_probability: f64,
    },
}

impl AdmissionDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmissionDecision::Accepted { .. })
    }

    pub fn qps(&self) -> f64 {
        match *self {
            AdmissionDecision::Accepted { qps } => qps,
            AdmissionDecision::Rejected { qps, .. } => qps,
        }
    }
}

struct ThrottleState {
    counter: SlidingWindowCounter,
    rng: StdRng,
}

/// Sliding-window QPS throttler
///
/// The counter and the random generator share one mutex; it is the only
/// synchronization point on the request path.
pub struct QpsThrottler {
    limit_qps: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<ThrottleState>,
}

impl QpsThrottler {
    /// Throttler on the system clock with an entropy-seeded generator
    pub fn new(config: ThrottleConfig) -> BusygateResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ThrottleConfig, clock: Arc<dyn Clock>) -> BusygateResult<Self> {
        Self::with_rng(config, clock, StdRng::from_entropy())
    }

    /// Full constructor; a fixed-seed `rng` makes decisions reproducible
    pub fn with_rng(config: ThrottleConfig, clock: Arc<dyn Clock>, rng: StdRng) -> BusygateResult<Self> {
        let mut v = ConfigValidator::new();
        v.validate_positive_rate("throttle_qps", config.limit_qps);
        v.finish()?;

        let counter = SlidingWindowCounter::new(config.window(), clock.now_ms())?;

        Ok(Self {
            limit_qps: config.limit_qps,
            clock,
            state: Mutex::new(ThrottleState { counter, rng }),
        })
    }

    /// Count this request and decide whether to admit it
    pub fn should_accept(&self) -> bool {
        self.decide().is_accepted()
    }

    /// Like `should_accept`, with the rate and probability behind the answer
    pub fn decide(&self) -> AdmissionDecision {
        let mut state = self.lock();
        let qps = state.counter.record_and_rate(self.clock.now_ms());

        if qps < self.limit_qps {
            return AdmissionDecision::Accepted { qps };
        }

        // qps >= limit > 0, so this is in (0, 1]
        let accept_probability = self.limit_qps / qps;
        if state.rng.gen::<f64>() < accept_probability {
            AdmissionDecision::Accepted { qps }
        } else {
            AdmissionDecision::Rejected {
                qps,
                accept_probability,
            }
        }
    }

    /// Current offered rate over the window, without counting a request
    pub fn current_qps(&self) -> f64 {
        let mut state = self.lock();
        state.counter.current_rate(self.clock.now_ms())
    }

    pub fn limit_qps(&self) -> f64 {
        self.limit_qps
    }

    pub fn window(&self) -> Duration {
        self.lock().counter.window()
    }

    /// Requests counted in the window as of the last update
    pub fn window_count(&self) -> u64 {
        self.lock().counter.sum()
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        // Counter invariants hold at every unlock, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for QpsThrottler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QpsThrottler")
            .field("limit_qps", &self.limit_qps)
            .field("window", &self.window())
            .field("window_count", &self.window_count())
            .finish()
    }
}
