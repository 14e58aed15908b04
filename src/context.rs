//! # Service Context
//!
//! The state shared between the throttle middleware and the health endpoint:
//! service identity, start time, the busyness reference rate, the single
//! throttler instance and accepted-request accounting.
//!
//! One context is built at startup and handed to both mount points as an
//! `Arc<ServiceContext>`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::accepted::AcceptedStats;
use crate::admission_control::QpsThrottler;
use crate::config_validator::ConfigValidator;
use crate::errors::BusygateResult;

/// Who this process is, as reported on `/healthz`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service: String,
    pub version: String,
}

impl ServiceIdentity {
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
        }
    }

    /// Identity of this crate's own build
    pub fn from_build() -> Self {
        Self::new(crate::version::SERVICE_NAME, crate::version::SERVICE_VERSION)
    }
}

pub struct ServiceContext {
    identity: ServiceIdentity,
    started_at: Instant,
    loaded_qps: f64,
    throttler: Arc<QpsThrottler>,
    accepted: AcceptedStats,
}

impl ServiceContext {
    /// Build the context; `loaded_qps` is the fully-loaded reference rate
    /// that `busyness` is measured against.
    pub fn new(
        identity: ServiceIdentity,
        loaded_qps: f64,
        throttler: Arc<QpsThrottler>,
        accepted: AcceptedStats,
    ) -> BusygateResult<Self> {
        let mut v = ConfigValidator::new();
        v.validate_non_empty("service.name", &identity.service)
            .validate_version("service.version", &identity.version)
            .validate_positive_rate("busy_qps", loaded_qps);
        v.finish()?;

        Ok(Self {
            identity,
            started_at: Instant::now(),
            loaded_qps,
            throttler,
            accepted,
        })
    }

    /// Override the uptime origin
    pub fn with_start_time(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn throttler(&self) -> &Arc<QpsThrottler> {
        &self.throttler
    }

    pub fn accepted(&self) -> &AcceptedStats {
        &self.accepted
    }

    pub fn loaded_qps(&self) -> f64 {
        self.loaded_qps
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Observed QPS relative to the fully-loaded reference rate
    pub fn busyness(&self) -> f64 {
        self.throttler.current_qps() / self.loaded_qps
    }

    /// Point-in-time snapshot for `/healthz`
    pub fn health_report(&self) -> HealthReport {
        let qps = self.throttler.current_qps();
        HealthReport {
            service: self.identity.service.clone(),
            version: self.identity.version.clone(),
            uptime: self.uptime(),
            accepted: self.accepted.total(),
            accepted_interval: self.accepted.interval_count(),
            busyness: qps / self.loaded_qps,
            qps,
            throttle_qps: self.throttler.limit_qps(),
            busy_qps: self.loaded_qps,
        }
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("identity", &self.identity)
            .field("loaded_qps", &self.loaded_qps)
            .field("throttler", &self.throttler)
            .field("accepted", &self.accepted.total())
            .finish()
    }
}

/// Health snapshot
///
/// Renders as plain text, one `key=value` per line. Consumers must tolerate
/// keys beyond the first five.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub service: String,
    pub version: String,
    pub uptime: Duration,
    pub accepted: u64,
    pub accepted_interval: u64,
    pub busyness: f64,
    pub qps: f64,
    pub throttle_qps: f64,
    pub busy_qps: f64,
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "busyness={:.6}", self.busyness)?;
        writeln!(f, "accepted={}", self.accepted)?;
        writeln!(f, "service={}", self.service)?;
        writeln!(f, "version={}", self.version)?;
        writeln!(f, "uptime={:.1}", self.uptime.as_secs_f64())?;
        writeln!(f, "accepted_interval={}", self.accepted_interval)?;
        writeln!(f, "qps={:.6}", self.qps)?;
        writeln!(f, "throttle_qps={}", self.throttle_qps)?;
        writeln!(f, "busy_qps={}", self.busy_qps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_control::ThrottleConfig;
    use crate::clock::ManualClock;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn context(loaded_qps: f64) -> BusygateResult<ServiceContext> {
        let throttler = QpsThrottler::with_rng(
            ThrottleConfig::new(1_000.0, Duration::from_millis(500)),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            StdRng::seed_from_u64(9),
        )?;
        ServiceContext::new(
            ServiceIdentity::new("clock", "1.0.0"),
            loaded_qps,
            Arc::new(throttler),
            AcceptedStats::default(),
        )
    }

    #[test]
    fn test_rejects_bad_identity_and_reference_rate() {
        let throttler = Arc::new(QpsThrottler::new(ThrottleConfig::default()).unwrap());
        let err = ServiceContext::new(
            ServiceIdentity::new(" ", "1.0"),
            0.0,
            throttler,
            AcceptedStats::default(),
        )
        .unwrap_err();
        assert_eq!(err.validation_errors().len(), 3);
    }

    #[test]
    fn test_busyness_uses_loaded_qps() {
        let ctx = context(200.0).unwrap();
        assert_eq!(ctx.busyness(), 0.0);

        for _ in 0..50 {
            assert!(ctx.throttler().should_accept());
        }
        // 50 requests / 0.5s = 100 qps against a 200 qps reference
        assert!((ctx.busyness() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_health_report_rendering() {
        let ctx = context(200.0)
            .unwrap()
            .with_start_time(Instant::now() - Duration::from_secs(3));
        ctx.throttler().should_accept();
        ctx.accepted().record_accept(|_| {});

        let text = ctx.health_report().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "busyness=0.010000");
        assert_eq!(lines[1], "accepted=1");
        assert_eq!(lines[2], "service=clock");
        assert_eq!(lines[3], "version=1.0.0");
        assert!(lines[4].starts_with("uptime=3."), "got {}", lines[4]);
        assert!(text.contains("qps=2.000000\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_build_identity() {
        let identity = ServiceIdentity::from_build();
        assert_eq!(identity.service, "busygate");
        assert!(crate::version::is_valid_version(&identity.version));
    }
}
