//! Shared state handed to every axum handler.

use crate::db::DbPool;
use crate::repositories::Repositories;
use crate::services::Services;

/// Services plus the pool they were built on.
///
/// Cloning is cheap: the pool and every service share their internals.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    /// Used directly by the health endpoints
    pub db_pool: DbPool,
}

impl AppState {
    pub fn new(pool: DbPool, jwt_secret: impl Into<String>) -> Self {
        let repos = Repositories::new(pool.clone());
        Self {
            services: Services::new(repos, jwt_secret),
            db_pool: pool,
        }
    }
}
