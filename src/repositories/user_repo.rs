//! User lookups needed to authenticate requests.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::db::{DbPool, MemoryTables, Statement};
use crate::error::AppResult;
use crate::models::Principal;
use crate::schema::users;

/// `SELECT id, role, is_active FROM users WHERE id = $1 AND is_active`
#[derive(Debug)]
pub struct FindActiveUser {
    pub user_id: i32,
}

#[async_trait]
impl Statement for FindActiveUser {
    type Output = Option<Principal>;

    fn name(&self) -> &'static str {
        "find_active_user"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<Option<Principal>> {
        users::table
            .find(self.user_id)
            .filter(users::is_active.eq(true))
            .select(Principal::as_select())
            .first(conn)
            .await
            .optional()
    }

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<Option<Principal>> {
        Ok(tables
            .user(self.user_id)
            .filter(|user| user.is_active)
            .map(Principal::from))
    }
}

/// User repository holding the connection pool.
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Finds a user that exists and is active.
    ///
    /// # Returns
    /// `Some(Principal)` if found, `None` for missing or deactivated users
    pub async fn find_active(&self, user_id: i32) -> AppResult<Option<Principal>> {
        self.pool.run_statement(&FindActiveUser { user_id }, None).await
    }
}
