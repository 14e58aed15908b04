//! Command-line surface

pub mod args;
pub mod commands;

pub use args::{Cli, Command, ConfigArgs};
pub use commands::{resolve_config, run, run_command};
