use diesel::result::QueryResult;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, TransactionManager};

use crate::db::Statement;
use crate::db::memory::MemoryStore;

pub(crate) type PgManager = AsyncDieselConnectionManager<AsyncPgConnection>;

/// A connection borrowed from a [`DbPool`](crate::db::DbPool).
///
/// The connection goes back to the pool when this value is dropped. A
/// connection dropped while a transaction is still open is discarded by the
/// pool instead of being reused.
pub enum DbConnection {
    Postgres(bb8::PooledConnection<'static, PgManager>),
    Memory(bb8::PooledConnection<'static, MemoryStore>),
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbConnection::Postgres(_) => f.write_str("DbConnection::Postgres"),
            DbConnection::Memory(conn) => write!(f, "DbConnection::{:?}", &**conn),
        }
    }
}

impl DbConnection {
    pub async fn run<S: Statement + ?Sized>(&mut self, statement: &S) -> QueryResult<S::Output> {
        match self {
            DbConnection::Postgres(conn) => statement.execute_pg(&mut **conn).await,
            DbConnection::Memory(conn) => conn.run(statement).await,
        }
    }

    pub async fn begin(&mut self) -> QueryResult<()> {
        match self {
            DbConnection::Postgres(conn) => AnsiTransactionManager::begin_transaction(&mut **conn).await,
            DbConnection::Memory(conn) => conn.begin().await,
        }
    }

    pub async fn commit(&mut self) -> QueryResult<()> {
        match self {
            DbConnection::Postgres(conn) => AnsiTransactionManager::commit_transaction(&mut **conn).await,
            DbConnection::Memory(conn) => conn.commit(),
        }
    }

    pub async fn rollback(&mut self) -> QueryResult<()> {
        match self {
            DbConnection::Postgres(conn) => {
                AnsiTransactionManager::rollback_transaction(&mut **conn).await
            }
            DbConnection::Memory(conn) => conn.rollback(),
        }
    }

    /// Whether a transaction is open on this connection. A connection whose
    /// transaction state is broken counts as open.
    pub fn in_transaction(&mut self) -> bool {
        match self {
            DbConnection::Postgres(conn) => {
                AnsiTransactionManager::transaction_manager_status_mut(&mut **conn)
                    .transaction_depth()
                    .map(|depth| depth.is_some())
                    .unwrap_or(true)
            }
            DbConnection::Memory(conn) => conn.in_transaction(),
        }
    }
}
