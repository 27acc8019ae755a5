//! HTTP server lifecycle: pool setup, optional migrations, serving and
//! graceful shutdown.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;

use crate::api::routes::create_router;
use crate::cli::ConfigurationMerger;
use crate::cli::handlers::run_pending_migrations;
use crate::config::{DatabaseConfig, Settings};
use crate::db::{DbPool, MemoryStore, establish_async_connection_pool};
use crate::error::AppResult;
use crate::logger::LogLevelHandle;
use crate::state::AppState;

pub struct Server {
    settings: Settings,
    reload: Option<(ConfigurationMerger, LogLevelHandle)>,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            reload: None,
        }
    }

    /// Re-reads `logger.level` from the configuration sources on SIGHUP.
    pub fn with_reload(mut self, merger: ConfigurationMerger, handle: Option<LogLevelHandle>) -> Self {
        self.reload = handle.map(|handle| (merger, handle));
        self
    }

    /// Runs until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails when the database is unreachable, migrations fail or the address
    /// cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = &self.settings;
        tracing::info!(
            app_name = %settings.application.name,
            app_version = %settings.application.version,
            host = %settings.server.host,
            port = settings.server.port,
            request_timeout = settings.server.request_timeout,
            "Application starting"
        );
        tracing::info!(
            url = %settings.database.redacted_url(),
            max_connections = settings.database.max_connections,
            min_connections = settings.database.min_connections,
            connection_timeout = settings.database.connection_timeout,
            "Database configuration loaded"
        );

        let pool = build_pool(&settings.database).await?;
        let latency = pool.verify_connectivity().await.map_err(|e| {
            tracing::error!(error = %e, "Database is unreachable");
            e
        })?;
        tracing::info!(
            latency_ms = latency.as_millis() as u64,
            "Database connection verified"
        );

        if settings.database.auto_migrate && !settings.database.is_memory() {
            let applied = run_pending_migrations(settings.database.url.clone()).await?;
            tracing::info!(count = applied.len(), migrations = ?applied, "Migrations applied");
        }

        let state = AppState::new(pool, settings.jwt.secret.clone());
        let router = create_router(state, Duration::from_secs(settings.server.request_timeout));

        let address = settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {address}: {e}")
        })?;
        tracing::info!(address = %address, "Server listening");

        if let Some((merger, handle)) = self.reload {
            spawn_reload_on_hangup(merger, handle);
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Builds the pool selected by `database.url`: in-process tables for
/// `memory://`, PostgreSQL otherwise.
pub async fn build_pool(database: &DatabaseConfig) -> AppResult<DbPool> {
    if database.is_memory() {
        tracing::warn!("Using the in-memory store; data is lost on shutdown");
        return Ok(DbPool::memory(
            MemoryStore::new(),
            database.max_connections,
            Duration::from_secs(database.connection_timeout),
        ));
    }
    establish_async_connection_pool(database).await
}

#[cfg(unix)]
fn spawn_reload_on_hangup(merger: ConfigurationMerger, handle: LogLevelHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler; log level reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match merger.load() {
                Ok(settings) => {
                    if let Err(e) = handle.set_level(&settings.logger.level) {
                        tracing::warn!(error = %e, "Failed to apply reloaded log level");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Configuration reload failed; keeping current settings"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_merger: ConfigurationMerger, _handle: LogLevelHandle) {}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
