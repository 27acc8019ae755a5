//! Migrate command handler
//!
//! Applies, lists or reverts the embedded SQL migrations. Migrations run on a
//! blocking `PgConnection`; an in-memory store has no schema to migrate.

use diesel::Connection;
use diesel::migration::Migration;
use diesel::pg::PgConnection;
use diesel_migrations::MigrationHarness;

use crate::config::DatabaseConfig;
use crate::db::MIGRATIONS;
use crate::error::{AppError, AppResult};

pub struct MigrateCommandHandler {
    database: DatabaseConfig,
}

impl MigrateCommandHandler {
    pub fn new(database: DatabaseConfig) -> Self {
        Self { database }
    }

    /// # Errors
    ///
    /// Connection failures, migration failures and rolling back more
    /// migrations than are applied.
    pub async fn execute(&self, dry_run: bool, rollback: Option<u32>) -> AppResult<()> {
        self.database.validate()?;

        if self.database.is_memory() {
            println!("In-memory store selected; there are no migrations to run");
            return Ok(());
        }

        if dry_run {
            let pending = pending_migrations(self.database.url.clone()).await?;
            if pending.is_empty() {
                println!("✓ No pending migrations - database is up to date");
            } else {
                println!("Found {} pending migration(s):", pending.len());
                for name in &pending {
                    println!("  - {name}");
                }
                println!("\nRun without --dry-run to apply them");
            }
            return Ok(());
        }

        match rollback {
            Some(steps) => {
                println!("Rolling back {steps} migration(s)...");
                let reverted = revert_migrations(self.database.url.clone(), steps).await?;
                println!("✓ Rolled back {} migration(s):", reverted.len());
                for name in &reverted {
                    println!("  - {name}");
                }
            }
            None => {
                let applied = run_pending_migrations(self.database.url.clone()).await?;
                if applied.is_empty() {
                    println!("✓ No migrations to apply - database is up to date");
                } else {
                    println!("✓ Applied {} migration(s):", applied.len());
                    for name in &applied {
                        println!("  - {name}");
                    }
                }
            }
        }

        Ok(())
    }
}

/// Applies every pending migration and returns their names.
pub async fn run_pending_migrations(database_url: String) -> AppResult<Vec<String>> {
    with_migration_connection(database_url, |conn| {
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| migration_error("run pending migrations", e))?;
        Ok(applied.iter().map(ToString::to_string).collect())
    })
    .await
}

async fn pending_migrations(database_url: String) -> AppResult<Vec<String>> {
    with_migration_connection(database_url, |conn| {
        let pending = conn
            .pending_migrations(MIGRATIONS)
            .map_err(|e| migration_error("check pending migrations", e))?;
        Ok(pending.iter().map(|m| m.name().to_string()).collect())
    })
    .await
}

async fn revert_migrations(database_url: String, steps: u32) -> AppResult<Vec<String>> {
    with_migration_connection(database_url, move |conn| {
        let applied = conn
            .applied_migrations()
            .map_err(|e| migration_error("list applied migrations", e))?;

        if applied.len() < steps as usize {
            return Err(AppError::validation(
                "rollback",
                format!(
                    "cannot roll back {steps} migration(s); only {} applied",
                    applied.len()
                ),
            ));
        }

        (0..steps)
            .map(|_| {
                conn.revert_last_migration(MIGRATIONS)
                    .map(|version| version.to_string())
                    .map_err(|e| migration_error("revert migration", e))
            })
            .collect()
    })
    .await
}

async fn with_migration_connection<T, F>(database_url: String, work: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&database_url).map_err(|e| AppError::Database {
            operation: "connect for migrations".to_string(),
            source: anyhow::Error::new(e),
        })?;
        work(&mut conn)
    })
    .await
    .map_err(|e| AppError::Internal {
        source: anyhow::Error::new(e),
    })?
}

fn migration_error(
    operation: &str,
    error: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> AppError {
    AppError::Database {
        operation: operation.to_string(),
        source: anyhow::anyhow!("{error}"),
    }
}
