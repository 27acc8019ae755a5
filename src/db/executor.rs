use crate::db::{DbConnection, DbPool, Statement};
use crate::error::{AppResult, DatabaseErrorConverter};

impl DbPool {
    /// Runs one statement.
    ///
    /// With `conn` the statement runs on the caller's connection, typically
    /// inside a transaction, and nothing is acquired or released here.
    /// Without it a connection is borrowed for the duration of the call and
    /// released on every exit path, including unwinding.
    ///
    /// Failures are logged with the statement name and its parameters and
    /// then returned.
    pub async fn run_statement<S: Statement>(
        &self,
        statement: &S,
        conn: Option<&mut DbConnection>,
    ) -> AppResult<S::Output> {
        let result = match conn {
            Some(conn) => conn.run(statement).await,
            None => {
                let mut conn = self.acquire().await?;
                conn.run(statement).await
            }
        };

        result.map_err(|error| {
            tracing::error!(
                statement = statement.name(),
                params = ?statement,
                error = %error,
                "Statement failed"
            );
            DatabaseErrorConverter::convert_diesel_error(error, statement.name())
        })
    }
}
