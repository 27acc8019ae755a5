//! Dispatches a parsed command.

use super::config_merger::ConfigurationMerger;
use super::handlers::{MigrateCommandHandler, ServeCommandHandler};
use super::parser::{Cli, Commands};
use crate::config::Settings;
use crate::logger::LogLevelHandle;
use crate::server::Server;

/// Runs the command in `cli` with already merged and validated settings.
///
/// `serve` (also the default when no subcommand is given) runs until a
/// shutdown signal.
pub async fn execute_command(
    cli: &Cli,
    settings: Settings,
    merger: ConfigurationMerger,
    log_handle: Option<LogLevelHandle>,
) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Serve { dry_run: true, .. }) => {
            ServeCommandHandler::new(settings).dry_run()?;
        }
        Some(Commands::Serve { .. }) | None => {
            Server::new(settings)
                .with_reload(merger, log_handle)
                .run()
                .await?;
        }
        Some(Commands::Migrate { dry_run, rollback }) => {
            MigrateCommandHandler::new(settings.database)
                .execute(*dry_run, *rollback)
                .await?;
        }
    }
    Ok(())
}
