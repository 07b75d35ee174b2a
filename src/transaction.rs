//! Transaction Module
//!
//! Provides the [`Transaction`] trait every guard query and body statement
//! runs through, and [`PgTransaction`], its `may_postgres` implementation.
//!
//! A transaction is a scoped resource: whoever begins one must commit or roll
//! it back. Implementations roll back on drop if neither happened, so a
//! panic unwinding through a migration never leaves a transaction open.

use crate::executor::{DbError, Rows};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError};

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Transaction error type
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] PostgresError),
    /// Transaction already committed or rolled back
    #[error("Transaction has already been committed or rolled back")]
    Closed,
    /// Other transaction errors
    #[error("Transaction error: {0}")]
    Other(String),
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Postgres(e) => DbError::Postgres(e),
            TransactionError::Closed => DbError::Other("Transaction closed".to_string()),
            TransactionError::Other(s) => DbError::Other(s),
        }
    }
}

/// An open database transaction
///
/// Guards query the catalog and bodies execute their statements through this
/// trait. `commit` and `rollback` consume the transaction, so it cannot be
/// used after it has been closed.
pub trait Transaction {
    /// Execute a SQL statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Execute a query and report how many rows it produced
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query(&self, query: &str, params: &[&dyn ToSql]) -> Result<Rows, DbError>;

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns `TransactionError` if the commit fails.
    fn commit(self: Box<Self>) -> Result<(), TransactionError>;

    /// Roll back the transaction
    ///
    /// # Errors
    ///
    /// Returns `TransactionError` if the rollback fails.
    fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

/// A `may_postgres` transaction
///
/// Opened with `BEGIN` on the wrapped client. Migrations always run inside
/// one outer transaction, so no savepoints are issued.
pub struct PgTransaction {
    client: Client,
    closed: bool,
}

impl PgTransaction {
    /// Start a new transaction on the given client
    pub(crate) fn begin(client: Client) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[])?;

        Ok(Self {
            client,
            closed: false,
        })
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Check if the transaction is closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn finish(&mut self, sql: &str) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::Closed);
        }
        // Postgres ends the transaction even when COMMIT fails, so the
        // handle is closed either way.
        self.closed = true;
        self.client.execute(sql, &[])?;
        Ok(())
    }
}

impl Transaction for PgTransaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();

        self.client.execute(query, params).map_err(DbError::Postgres)
    }

    fn query(&self, query: &str, params: &[&dyn ToSql]) -> Result<Rows, DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(query).entered();

        let rows = self.client.query(query, params).map_err(DbError::Postgres)?;
        Ok(Rows::new(rows.len()))
    }

    fn commit(mut self: Box<Self>) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.finish("COMMIT")
    }

    fn rollback(mut self: Box<Self>) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.finish("ROLLBACK")
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        log::warn!("transaction dropped while open, rolling back");
        // Errors cannot be propagated out of drop
        if let Err(e) = self.client.execute("ROLLBACK", &[]) {
            log::error!("rollback of dropped transaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError::Closed;
        assert!(err
            .to_string()
            .contains("Transaction has already been committed"));

        let err = TransactionError::Other("test error".to_string());
        assert!(err.to_string().contains("Transaction error"));
    }

    #[test]
    fn test_transaction_error_conversion() {
        let err: DbError = TransactionError::Closed.into();
        assert!(err.to_string().contains("Transaction closed"));

        let err: DbError = TransactionError::Other("lost connection".to_string()).into();
        assert!(err.to_string().contains("lost connection"));
    }
}
