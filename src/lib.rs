//! busygate - sliding-window QPS admission control for HTTP services
//!
//! A `QpsThrottler` counts every request over a millisecond-resolution
//! sliding window and sheds the excess with probability proportional to how
//! far the offered rate is above the limit. The same window feeds a
//! `busyness` scalar on a plain-text `/healthz` endpoint for load-aware
//! routing and autoscaling.

pub mod accepted;
pub mod admission_control;
pub mod cli;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod context;
pub mod errors;
pub mod http_server;
pub mod sliding_window;
pub mod telemetry;
pub mod version;

pub use accepted::{AcceptedStats, IntervalReport};
pub use admission_control::{AdmissionDecision, QpsThrottler, ThrottleConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServiceConfig;
pub use context::{HealthReport, ServiceContext, ServiceIdentity};
pub use errors::{BusygateError, BusygateResult};
pub use http_server::{apply_throttle, health_routes, HttpServer, TOO_BUSY_MESSAGE};
pub use sliding_window::SlidingWindowCounter;
