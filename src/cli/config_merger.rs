//! Merges command-line overrides into file and environment configuration.
//!
//! Precedence, highest first: `serve` flags, `--verbose`/`--quiet`,
//! `STOREFRONT_*` variables, configuration files.

use super::parser::{Cli, Commands};
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, Settings};

/// Settings values taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl CliOverrides {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut overrides = Self::default();

        if cli.verbose {
            overrides.log_level = Some("debug".to_string());
        } else if cli.quiet {
            overrides.log_level = Some("error".to_string());
        }

        if let Some(Commands::Serve {
            host,
            port,
            log_level,
            ..
        }) = &cli.command
        {
            overrides.host = host.clone();
            overrides.port = *port;
            if let Some(level) = log_level {
                overrides.log_level = Some(level.as_str().to_string());
            }
        }

        overrides
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logger.level = level.clone();
        }
    }
}

/// A configuration loader paired with the command-line overrides.
///
/// Kept by the server so that a reload re-applies the same overrides.
#[derive(Debug, Clone)]
pub struct ConfigurationMerger {
    loader: ConfigLoader,
    overrides: CliOverrides,
}

impl ConfigurationMerger {
    pub fn new(loader: ConfigLoader, overrides: CliOverrides) -> Self {
        Self { loader, overrides }
    }

    /// Builds the loader from the environment, then `--config` and `--env`.
    ///
    /// # Errors
    ///
    /// Fails when `STOREFRONT_CONFIG_DIR` and `STOREFRONT_CONFIG_FILE` are
    /// both set.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut loader = ConfigLoader::from_env()?;
        if let Some(path) = &cli.config {
            loader = loader.with_config_file(path);
        }
        if let Some(env) = cli.env {
            loader = loader.with_environment(env.into());
        }
        Ok(Self::new(loader, CliOverrides::from_cli(cli)))
    }

    /// Loads the configuration, applies the overrides and validates the result.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let mut settings = self.loader.load_unvalidated()?;
        self.overrides.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }
}
