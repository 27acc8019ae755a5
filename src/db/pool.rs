//! Bounded connection pool shared by repositories, services and the
//! transaction coordinator.
//!
//! Uses bb8 with diesel_async for PostgreSQL, or with [`MemoryStore`] when the
//! service runs against in-process tables.

use std::time::{Duration, Instant};

use bb8::RunError;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;

use crate::config::DatabaseConfig;
use crate::db::connection::PgManager;
use crate::db::memory::MemoryStore;
use crate::db::{DbConnection, Ping};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
enum Backend {
    Postgres(bb8::Pool<PgManager>),
    Memory(bb8::Pool<MemoryStore>),
}

/// Connection pool handle.
///
/// bb8::Pool internally uses Arc, so Clone is cheap. Structures holding a
/// `DbPool` can derive Clone without additional Arc wrapping.
#[derive(Clone)]
pub struct DbPool {
    backend: Backend,
    max_size: u32,
    acquire_timeout: Duration,
}

/// Snapshot of pool occupancy, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub backend: &'static str,
    pub max_size: u32,
    pub connections: u32,
    pub idle_connections: u32,
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbPool")
            .field("status", &self.status())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Creates the PostgreSQL connection pool described by `config`.
///
/// Building the pool opens `min_connections` connections, so an unreachable
/// database is reported here.
///
/// # Example
///
/// ```ignore
/// let pool = establish_async_connection_pool(&settings.database).await?;
/// pool.verify_connectivity().await?;
/// ```
pub async fn establish_async_connection_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.url.as_str());
    let acquire_timeout = Duration::from_secs(config.connection_timeout);
    let pool = bb8::Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_connections))
        .connection_timeout(acquire_timeout)
        .build(manager)
        .await
        .map_err(|e| AppError::ConnectionPool {
            source: anyhow::Error::new(e).context("failed to build PostgreSQL pool"),
        })?;

    Ok(DbPool {
        backend: Backend::Postgres(pool),
        max_size: config.max_connections,
        acquire_timeout,
    })
}

impl DbPool {
    /// Creates a pool over an in-memory store. Connections are opened lazily.
    pub fn memory(store: MemoryStore, max_size: u32, acquire_timeout: Duration) -> Self {
        let pool = bb8::Pool::builder()
            .max_size(max_size)
            .connection_timeout(acquire_timeout)
            .retry_connection(false)
            .build_unchecked(store);
        Self {
            backend: Backend::Memory(pool),
            max_size,
            acquire_timeout,
        }
    }

    /// Borrows a connection, waiting at most the configured acquisition timeout.
    pub async fn acquire(&self) -> AppResult<DbConnection> {
        match &self.backend {
            Backend::Postgres(pool) => pool
                .get_owned()
                .await
                .map(DbConnection::Postgres)
                .map_err(|e| self.acquire_error(e)),
            Backend::Memory(pool) => pool
                .get_owned()
                .await
                .map(DbConnection::Memory)
                .map_err(|e| self.acquire_error(e)),
        }
    }

    /// Acquires a connection and runs `SELECT 1`, returning the round trip time.
    pub async fn verify_connectivity(&self) -> AppResult<Duration> {
        let started = Instant::now();
        self.run_statement(&Ping, None).await?;
        Ok(started.elapsed())
    }

    pub fn status(&self) -> PoolStatus {
        let (backend, state) = match &self.backend {
            Backend::Postgres(pool) => ("postgres", pool.state()),
            Backend::Memory(pool) => ("memory", pool.state()),
        };
        PoolStatus {
            backend,
            max_size: self.max_size,
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    fn acquire_error<E>(&self, error: RunError<E>) -> AppError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match error {
            RunError::TimedOut => {
                tracing::warn!(
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "Timed out waiting for a pooled connection"
                );
                AppError::AcquireTimeout {
                    waited_ms: self.acquire_timeout.as_millis() as u64,
                }
            }
            RunError::User(e) => AppError::ConnectionPool {
                source: anyhow::Error::new(e),
            },
        }
    }
}
