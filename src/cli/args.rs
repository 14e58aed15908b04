//! CLI argument definitions using clap
//!
//! Commands:
//! - busygate serve [--config <path>] [overrides]
//! - busygate check-config [--config <path>] [overrides]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ServiceConfig;

/// busygate - QPS admission control with a busyness health endpoint
#[derive(Parser, Debug)]
#[command(name = "busygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the throttled application listener and the health listener
    Serve {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate configuration and print the effective values
    CheckConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Configuration file plus per-field overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// IP to listen on (default: all interfaces)
    #[arg(long)]
    pub ip: Option<String>,

    /// Port for the throttled application listener
    #[arg(long)]
    pub port: Option<u16>,

    /// Port for the /healthz listener
    #[arg(long)]
    pub health_port: Option<u16>,

    /// Fully-loaded reference QPS used to compute busyness
    #[arg(long)]
    pub busy_qps: Option<f64>,

    /// QPS above which requests are shed with 503
    #[arg(long)]
    pub throttle_qps: Option<f64>,

    /// Averaging window in milliseconds
    #[arg(long)]
    pub window_ms: Option<u64>,

    /// Milliseconds between accepted-QPS summary log lines
    #[arg(long)]
    pub report_interval_ms: Option<u64>,
}

impl ConfigArgs {
    /// Overwrite every field of `config` that was given on the command line
    pub fn apply_to(&self, config: &mut ServiceConfig) {
        if let Some(ip) = &self.ip {
            config.server.ip = ip.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(port) = self.health_port {
            config.server.health_port = port;
        }
        if let Some(qps) = self.busy_qps {
            config.throttle.busy_qps = qps;
        }
        if let Some(qps) = self.throttle_qps {
            config.throttle.throttle_qps = qps;
        }
        if let Some(ms) = self.window_ms {
            config.throttle.window_ms = ms;
        }
        if let Some(ms) = self.report_interval_ms {
            config.throttle.report_interval_ms = ms;
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "busygate",
            "serve",
            "--port",
            "9000",
            "--health-port",
            "9001",
            "--throttle-qps",
            "250.5",
            "--window-ms",
            "1000",
        ])
        .unwrap();

        let Command::Serve { config: args } = cli.command else {
            panic!("expected serve");
        };
        let mut config = ServiceConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.health_port, 9001);
        assert_eq!(config.throttle.throttle_qps, 250.5);
        assert_eq!(config.throttle.window_ms, 1000);
        // untouched
        assert_eq!(config.throttle.busy_qps, 800.0);
    }

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::try_parse_from(["busygate", "check-config", "--config", "/etc/busygate.toml"]).unwrap();
        match cli.command {
            Command::CheckConfig { config } => {
                assert_eq!(config.config, Some(PathBuf::from("/etc/busygate.toml")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_numeric_rate() {
        assert!(Cli::try_parse_from(["busygate", "serve", "--busy-qps", "lots"]).is_err());
    }
}
