//! Service configuration
//!
//! Loaded from an optional TOML file; command-line flags are applied on top
//! by the CLI. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! [service]
//! name = "clock"
//! version = "1.0.0"
//!
//! [server]
//! ip = "127.0.0.1"
//! port = 8082
//! health_port = 8083
//!
//! [throttle]
//! busy_qps = 800.0
//! throttle_qps = 1000.0
//! window_ms = 500
//! report_interval_ms = 1000
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::accepted::AcceptedStats;
use crate::admission_control::{QpsThrottler, ThrottleConfig, DEFAULT_WINDOW_MS};
use crate::config_validator::ConfigValidator;
use crate::context::{ServiceContext, ServiceIdentity};
use crate::errors::{BusygateError, BusygateResult};
use crate::sliding_window::MAX_WINDOW_MS;
use crate::version::{DEFAULT_HEALTH_PORT, DEFAULT_PORT, SERVICE_NAME, SERVICE_VERSION};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub server: ServerSection,
    pub throttle: ThrottleSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    pub name: String,
    pub version: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            version: SERVICE_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// IP to listen on; empty means all interfaces
    pub ip: String,
    pub port: u16,
    pub health_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: DEFAULT_PORT,
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleSection {
    /// Fully-loaded reference rate; `busyness` is measured against it
    pub busy_qps: f64,
    /// Rate above which requests are shed
    pub throttle_qps: f64,
    pub window_ms: u64,
    pub report_interval_ms: u64,
}

impl Default for ThrottleSection {
    fn default() -> Self {
        Self {
            busy_qps: 800.0,
            throttle_qps: 1000.0,
            window_ms: DEFAULT_WINDOW_MS,
            report_interval_ms: 1000,
        }
    }
}

impl ServiceConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> BusygateResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| BusygateError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ServiceConfig =
            toml::from_str(&content).map_err(|source| BusygateError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every field, reporting all failures together
    pub fn validate(&self) -> BusygateResult<()> {
        let mut v = ConfigValidator::new();
        v.validate_non_empty("service.name", &self.service.name)
            .validate_version("service.version", &self.service.version)
            .validate_port("server.port", self.server.port)
            .validate_port("server.health_port", self.server.health_port)
            .validate_distinct_ports(
                "server.health_port",
                self.server.health_port,
                "server.port",
                self.server.port,
            )
            .validate_listen_ip("server.ip", &self.server.ip)
            .validate_positive_rate("throttle.busy_qps", self.throttle.busy_qps)
            .validate_positive_rate("throttle.throttle_qps", self.throttle.throttle_qps)
            .validate_duration_ms("throttle.window_ms", self.throttle.window_ms, 1, MAX_WINDOW_MS)
            .validate_duration_ms(
                "throttle.report_interval_ms",
                self.throttle.report_interval_ms,
                1,
                u64::MAX,
            );
        v.finish()?;
        Ok(())
    }

    /// Address of the throttled application listener
    pub fn listen_addr(&self) -> String {
        join_host_port(&self.server.ip, self.server.port)
    }

    /// Address of the health listener
    pub fn health_addr(&self) -> String {
        join_host_port(&self.server.ip, self.server.health_port)
    }

    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity::new(&self.service.name, &self.service.version)
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig {
            limit_qps: self.throttle.throttle_qps,
            window_ms: self.throttle.window_ms,
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.throttle.report_interval_ms)
    }

    /// Build the shared context: throttler, identity and accounting
    pub fn build_context(&self) -> BusygateResult<Arc<ServiceContext>> {
        self.build_context_at(Instant::now())
    }

    /// Like `build_context`, with uptime measured from `started_at`
    pub fn build_context_at(&self, started_at: Instant) -> BusygateResult<Arc<ServiceContext>> {
        self.validate()?;
        let throttler = QpsThrottler::new(self.throttle_config())?;
        let ctx = ServiceContext::new(
            self.identity(),
            self.throttle.busy_qps,
            Arc::new(throttler),
            AcceptedStats::new(self.report_interval()),
        )?;
        Ok(Arc::new(ctx.with_start_time(started_at)))
    }
}

fn join_host_port(ip: &str, port: u16) -> String {
    if ip.is_empty() {
        format!("0.0.0.0:{}", port)
    } else if ip.contains(':') && !ip.starts_with('[') {
        format!("[{}]:{}", ip, port)
    } else {
        format!("{}:{}", ip, port)
    }
}
