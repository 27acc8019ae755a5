//! Transaction coordinator.
//!
//! A unit of work owns one pooled connection from `BEGIN` until the
//! transaction is committed or rolled back. The work runs on its own task, so
//! a caller that is cancelled mid-request cannot leave a transaction open on
//! a connection that returns to the pool.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::db::{DbConnection, DbPool};
use crate::error::{AppError, AppResult, DatabaseErrorConverter};

/// Lifecycle of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionState::Open => "OPEN",
            TransactionState::Committing => "COMMITTING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::RollingBack => "ROLLING_BACK",
            TransactionState::RolledBack => "ROLLED_BACK",
        };
        f.write_str(s)
    }
}

fn transition(tx_id: Uuid, state: TransactionState) {
    tracing::debug!(tx_id = %tx_id, state = %state, "Transaction state changed");
}

impl DbPool {
    /// Runs `work` inside a transaction on a single connection.
    ///
    /// Commits when `work` succeeds and rolls back when it fails, returning
    /// the original error. If the rollback fails too, both causes are
    /// returned as [`AppError::RollbackFailed`]. A failed commit is rolled
    /// back when the transaction is still open. The connection is released
    /// on every path.
    ///
    /// ```ignore
    /// let id = pool
    ///     .with_transaction(move |conn| {
    ///         async move { pool_for_work.run_statement(&statement, Some(conn)).await }.boxed()
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_transaction<T, F>(&self, work: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, AppResult<T>> + Send + 'static,
    {
        let pool = self.clone();
        tokio::spawn(async move { pool.run_transaction(work).await })
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::anyhow!("transaction task failed: {e}"),
            })?
    }

    async fn run_transaction<T, F>(&self, work: F) -> AppResult<T>
    where
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, AppResult<T>>,
    {
        let tx_id = Uuid::new_v4();
        let mut conn = self.acquire().await?;

        conn.begin()
            .await
            .map_err(|e| DatabaseErrorConverter::convert_diesel_error(e, "begin transaction"))?;
        transition(tx_id, TransactionState::Open);

        match work(&mut conn).await {
            Ok(value) => {
                transition(tx_id, TransactionState::Committing);
                match conn.commit().await {
                    Ok(()) => {
                        transition(tx_id, TransactionState::Committed);
                        Ok(value)
                    }
                    Err(e) => {
                        tracing::error!(tx_id = %tx_id, error = %e, "Commit failed");
                        let cause = DatabaseErrorConverter::convert_diesel_error(e, "commit transaction");
                        if conn.in_transaction() {
                            Err(roll_back(&mut conn, tx_id, cause).await)
                        } else {
                            Err(cause)
                        }
                    }
                }
            }
            Err(cause) => Err(roll_back(&mut conn, tx_id, cause).await),
        }
    }
}

async fn roll_back(conn: &mut DbConnection, tx_id: Uuid, cause: AppError) -> AppError {
    transition(tx_id, TransactionState::RollingBack);
    match conn.rollback().await {
        Ok(()) => {
            transition(tx_id, TransactionState::RolledBack);
            cause
        }
        Err(e) => {
            tracing::error!(
                tx_id = %tx_id,
                cause = %cause,
                error = %e,
                "Rollback failed, connection will be discarded"
            );
            AppError::RollbackFailed {
                cause: Box::new(cause),
                rollback: Box::new(DatabaseErrorConverter::convert_diesel_error(
                    e,
                    "rollback transaction",
                )),
            }
        }
    }
}
