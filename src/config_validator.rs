//! Configuration Validation
//!
//! Validates throttle, identity and listener settings before anything is
//! constructed. Every failing field is collected so operators see all
//! problems in one pass instead of fixing them one restart at a time.

use std::net::Ipv6Addr;

use crate::version::is_valid_version;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid configuration for '{}': {} (value: {})",
            self.field, self.message, self.value
        )
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of config validation
pub type ConfigResult<T> = Result<T, Vec<ConfigValidationError>>;

/// Configuration validator
pub struct ConfigValidator {
    errors: Vec<ConfigValidationError>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn error(&mut self, field: &str, value: impl std::fmt::Display, message: &str) {
        self.errors.push(ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        });
    }

    /// Validate port number (1-65535)
    pub fn validate_port(&mut self, field: &str, port: u16) -> &mut Self {
        if port == 0 {
            self.error(field, port, "Port must be between 1 and 65535");
        }
        self
    }

    /// Validate a rate: finite and strictly greater than zero
    pub fn validate_positive_rate(&mut self, field: &str, value: f64) -> &mut Self {
        if !value.is_finite() || value <= 0.0 {
            self.error(field, value, "Rate must be a positive, finite number");
        }
        self
    }

    /// Validate duration in milliseconds
    pub fn validate_duration_ms(&mut self, field: &str, ms: u64, min_ms: u64, max_ms: u64) -> &mut Self {
        if ms < min_ms || ms > max_ms {
            self.error(
                field,
                format!("{}ms", ms),
                &format!("Duration must be between {}ms and {}ms", min_ms, max_ms),
            );
        }
        self
    }

    /// Validate non-empty string
    pub fn validate_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, value, "Value cannot be empty");
        }
        self
    }

    /// Validate a `major.minor.patch` version string
    pub fn validate_version(&mut self, field: &str, value: &str) -> &mut Self {
        if !is_valid_version(value) {
            self.error(field, value, "Version must be in format x.y.z");
        }
        self
    }

    /// Validate a listen host (empty means all interfaces)
    ///
    /// The port has its own field, so a host that already carries one is
    /// refused. Bare and bracketed IPv6 literals are accepted.
    pub fn validate_listen_ip(&mut self, field: &str, ip: &str) -> &mut Self {
        let bare = ip
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(ip);
        if bare.contains(':') && bare.parse::<Ipv6Addr>().is_err() {
            self.error(field, ip, "Host must not include a ':<port>' suffix");
        } else if bare.chars().any(char::is_whitespace) {
            self.error(field, ip, "Host must not contain whitespace");
        }
        self
    }

    /// Validate that two ports are not the same
    pub fn validate_distinct_ports(&mut self, field: &str, port: u16, other_field: &str, other: u16) -> &mut Self {
        if port == other {
            self.error(field, port, &format!("Port must differ from '{}'", other_field));
        }
        self
    }

    /// Finish validation and return result
    pub fn finish(self) -> ConfigResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Check if any errors occurred
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Format validation errors for display
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
