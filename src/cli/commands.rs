//! CLI command implementations

use crate::config::ServiceConfig;
use crate::errors::{BusygateError, BusygateResult};
use crate::http_server::HttpServer;

use super::args::{Command, ConfigArgs};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> BusygateResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> BusygateResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Effective configuration: file (or defaults), then flag overrides, validated
pub fn resolve_config(args: &ConfigArgs) -> BusygateResult<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

/// Start both listeners and serve until Ctrl-C
pub fn serve(args: &ConfigArgs) -> BusygateResult<()> {
    let config = resolve_config(args)?;
    let rt = tokio::runtime::Runtime::new().map_err(BusygateError::Runtime)?;
    rt.block_on(HttpServer::start(config))
}

/// Print the effective configuration as TOML
pub fn check_config(args: &ConfigArgs) -> BusygateResult<()> {
    let config = resolve_config(args)?;
    print!("{}", render_config(&config));
    Ok(())
}

fn render_config(config: &ServiceConfig) -> String {
    // Plain structs of strings and numbers always serialize.
    toml::to_string_pretty(config).unwrap_or_else(|e| format!("# unable to render config: {}\n", e))
}
