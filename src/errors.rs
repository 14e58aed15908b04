//! # Errors
//!
//! Everything that can go wrong is either a configuration problem caught
//! before serving starts, or a listener/runtime failure. Overload is not an
//! error: it is answered with a 503 by the throttle middleware.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config_validator::{format_validation_errors, ConfigValidationError};

/// Result type for busygate operations
pub type BusygateResult<T> = Result<T, BusygateError>;

#[derive(Debug, Error)]
pub enum BusygateError {
    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    InvalidConfig(Vec<ConfigValidationError>),

    #[error("Failed to read config file {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] io::Error),

    #[error("Failed to create async runtime: {0}")]
    Runtime(#[source] io::Error),
}

impl BusygateError {
    /// Whether the process refused to start because of its configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BusygateError::InvalidConfig(_)
                | BusygateError::ConfigRead { .. }
                | BusygateError::ConfigParse { .. }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_config_error() {
            2
        } else {
            1
        }
    }

    /// Validation failures, if this is a configuration error
    pub fn validation_errors(&self) -> &[ConfigValidationError] {
        match self {
            BusygateError::InvalidConfig(errors) => errors,
            _ => &[],
        }
    }
}

impl From<Vec<ConfigValidationError>> for BusygateError {
    fn from(errors: Vec<ConfigValidationError>) -> Self {
        BusygateError::InvalidConfig(errors)
    }
}
