//! Service identity defaults
//!
//! Name and version come from Cargo metadata so the binary always reports
//! what it was built as. Install verifiers compare the `/healthz` version
//! against the package version, so it must stay in `x.y.z` form.

use std::sync::OnceLock;

use regex::Regex;

pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for the throttled application listener
pub const DEFAULT_PORT: u16 = 8082;

/// Default port for the health listener
pub const DEFAULT_HEALTH_PORT: u16 = 8083;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("version pattern is valid"))
}

/// Whether `version` is a plain `major.minor.patch` triple
pub fn is_valid_version(version: &str) -> bool {
    version_pattern().is_match(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_identity_is_sane() {
        assert!(!SERVICE_NAME.is_empty());
        assert!(is_valid_version(SERVICE_VERSION), "got {:?}", SERVICE_VERSION);
        assert_ne!(DEFAULT_PORT, DEFAULT_HEALTH_PORT);
    }

    #[test]
    fn test_version_format() {
        assert!(is_valid_version("1.0.0"));
        assert!(is_valid_version("10.20.300"));

        assert!(!is_valid_version(""));
        assert!(!is_valid_version("1.0"));
        assert!(!is_valid_version("v1.0.0"));
        assert!(!is_valid_version("1.0.0-beta"));
        assert!(!is_valid_version("1.0.0\n"));
    }
}
