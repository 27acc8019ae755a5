//! Command-line interface: argument parsing, configuration overrides and
//! the `serve` / `migrate` commands.

pub mod config_merger;
pub mod executor;
pub mod handlers;
pub mod parser;
pub mod validation;

pub use config_merger::{CliOverrides, ConfigurationMerger};
pub use executor::execute_command;
pub use parser::{Cli, Commands, Environment, LogLevel};

use crate::config::Settings;
use crate::logger::{LogLevelHandle, init_logger};

/// Loads the configuration selected by `cli` and applies its overrides.
///
/// Returns the merger as well, so the server can reload with the same sources.
pub fn load_settings(cli: &Cli) -> anyhow::Result<(Settings, ConfigurationMerger)> {
    let merger = ConfigurationMerger::from_cli(cli)?;
    let settings = merger.load()?;
    Ok((settings, merger))
}

/// Installs the global subscriber described by `settings.logger`.
pub fn init_logger_from_settings(settings: &Settings) -> anyhow::Result<LogLevelHandle> {
    let config = settings.logger.clone().into_logger_config()?;
    Ok(init_logger(config)?)
}
