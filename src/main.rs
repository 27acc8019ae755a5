use clap::Parser;

use storefront::cli::{Cli, execute_command, init_logger_from_settings, load_settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The logger is configured from these settings, so failures go to stderr
    let (settings, merger) = match load_settings(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return Err(e);
        }
    };

    let handle = init_logger_from_settings(&settings)?;
    tracing::debug!(settings = ?settings, "Configuration loaded");

    execute_command(&cli, settings, merger, Some(handle)).await
}
