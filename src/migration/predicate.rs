//! Catalog existence checks
//!
//! Read-only queries against `information_schema` and the `pg_*` catalog
//! views. Each answers "does this object exist" for a guard.

use crate::executor::DbError;
use crate::migration::MigrationError;
use crate::transaction::Transaction;
use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) const TABLE_EXISTS: &str = "SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1";

pub(crate) const COLUMN_EXISTS: &str = "SELECT 1 FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2";

pub(crate) const CONSTRAINT_EXISTS: &str = "SELECT 1 FROM information_schema.table_constraints \
     WHERE constraint_schema = current_schema() AND constraint_name = $1";

pub(crate) const INDEX_EXISTS: &str = "SELECT 1 FROM pg_indexes \
     WHERE schemaname = current_schema() AND tablename = $1 AND indexname = $2";

pub(crate) const ROLE_EXISTS: &str = "SELECT 1 FROM pg_roles WHERE lower(rolname) = lower($1)";

#[allow(clippy::expect_used)] // Constant pattern
static SELECT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*select\b").expect("valid SELECT prefix pattern"));

pub fn table_exists(tx: &dyn Transaction, table: &str) -> Result<bool, DbError> {
    Ok(tx.query(TABLE_EXISTS, &[&table])?.any())
}

pub fn column_exists(tx: &dyn Transaction, table: &str, column: &str) -> Result<bool, DbError> {
    Ok(tx.query(COLUMN_EXISTS, &[&table, &column])?.any())
}

pub fn constraint_exists(tx: &dyn Transaction, constraint: &str) -> Result<bool, DbError> {
    Ok(tx.query(CONSTRAINT_EXISTS, &[&constraint])?.any())
}

pub fn index_exists(tx: &dyn Transaction, table: &str, index: &str) -> Result<bool, DbError> {
    Ok(tx.query(INDEX_EXISTS, &[&table, &index])?.any())
}

/// Role names are compared case-insensitively
pub fn role_exists(tx: &dyn Transaction, role: &str) -> Result<bool, DbError> {
    Ok(tx.query(ROLE_EXISTS, &[&role])?.any())
}

/// Check that a conditional guard was given a SELECT statement
///
/// Leading whitespace is allowed. `SELECT` must appear as a whole word
/// (`SELECTED ...` is rejected) and is matched case-insensitively. Statements
/// that open with `(` or `WITH` are rejected.
///
/// # Errors
///
/// Returns `MigrationError::InvalidGuardQuery` for anything else.
pub fn validate_select(sql: &str) -> Result<(), MigrationError> {
    if SELECT_PREFIX.is_match(sql) {
        Ok(())
    } else {
        Err(MigrationError::InvalidGuardQuery(sql.to_string()))
    }
}

/// Whether a caller-supplied SELECT returns at least one row
///
/// The statement must already have passed [`validate_select`].
pub fn query_has_rows(tx: &dyn Transaction, select: &str) -> Result<bool, DbError> {
    Ok(tx.query(select, &[])?.any())
}
