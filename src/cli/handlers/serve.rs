//! Serve command handler
//!
//! `serve --dry-run` reports the validated configuration and exits; a normal
//! run is started by the caller through [`crate::server::Server`].

use crate::config::Settings;
use crate::error::AppResult;

pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Validates the configuration and prints what the server would use.
    pub fn dry_run(&self) -> AppResult<()> {
        self.config.validate()?;

        let database = &self.config.database;
        println!("✓ Configuration is valid");
        println!("✓ Server would bind to: {}", self.config.server.address());
        println!(
            "✓ Database: {} (pool {}..{}, acquire timeout {}s)",
            database.redacted_url(),
            database.min_connections,
            database.max_connections,
            database.connection_timeout
        );
        println!(
            "✓ Request timeout: {}s",
            self.config.server.request_timeout
        );
        println!("✓ Log level: {}", self.config.logger.level);
        println!("Dry run completed successfully");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
