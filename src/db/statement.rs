use async_trait::async_trait;
use diesel::result::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::db::memory::MemoryTables;

/// A single parameterized statement that can run on either backend.
///
/// The `Debug` output of a statement is its parameter list; it is what the
/// executor logs when the statement fails.
#[async_trait]
pub trait Statement: std::fmt::Debug + Send + Sync {
    type Output: Send;

    /// Stable name used in logs, error context and fault injection.
    fn name(&self) -> &'static str;

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<Self::Output>;

    fn execute_memory(&self, tables: &mut MemoryTables) -> QueryResult<Self::Output>;
}

/// `SELECT 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

#[async_trait]
impl Statement for Ping {
    type Output = ();

    fn name(&self) -> &'static str {
        "ping"
    }

    async fn execute_pg(&self, conn: &mut AsyncPgConnection) -> QueryResult<()> {
        diesel::sql_query("SELECT 1").execute(conn).await.map(|_| ())
    }

    fn execute_memory(&self, _tables: &mut MemoryTables) -> QueryResult<()> {
        Ok(())
    }
}
