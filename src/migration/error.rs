//! Migration-specific error types

use crate::executor::DbError;
use crate::transaction::TransactionError;

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The guard needs more positional subjects than the operation was given
    #[error("{label}: guard requires {expected} subject argument(s), got {actual}")]
    ArgumentCount {
        label: String,
        expected: usize,
        actual: usize,
    },
    /// A conditional run guard was given something other than a SELECT
    #[error("conditional guard query must be a SELECT statement, got: {0}")]
    InvalidGuardQuery(String),
    /// The existence check itself failed
    #[error("{label}: existence check failed: {source}")]
    Predicate {
        label: String,
        #[source]
        source: DbError,
    },
    /// A body statement failed; later statements were not run
    #[error("statement {index} failed: {source}\n  SQL: {sql}")]
    Statement {
        index: usize,
        sql: String,
        #[source]
        source: DbError,
    },
    /// Begin or commit failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    /// Rolling back after a failure failed as well
    #[error("{error}\nrollback also failed: {rollback}")]
    RollbackFailed {
        error: Box<MigrationError>,
        rollback: TransactionError,
    },
    /// The registry lock could not be acquired
    #[error("migration registry unavailable: {0}")]
    Registry(String),
}

impl MigrationError {
    /// Configuration errors are raised before any database interaction.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MigrationError::ArgumentCount { .. } | MigrationError::InvalidGuardQuery(_)
        )
    }

    /// The error that started the failure, looking through a failed rollback.
    #[must_use]
    pub fn root(&self) -> &MigrationError {
        match self {
            MigrationError::RollbackFailed { error, .. } => error.root(),
            other => other,
        }
    }
}
