//! # Schemaguard
//!
//! Guarded, idempotent PostgreSQL schema migrations on `may_postgres`.
//!
//! Migrations are trees of guarded operations. Each guard asks the catalog
//! whether its table, column, index, constraint or role already exists and
//! runs its SQL only when needed, so the same tree can be applied on every
//! startup. A tree can be dry-run first: `test` executes everything inside a
//! transaction that is always rolled back.
//!
//! See [`migration`] for the building blocks and an example.

pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod transaction;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod test_helpers;

#[cfg(feature = "tracing")]
mod tracing_helpers;

pub use crate::config::DatabaseConfig;
pub use connection::{connect, connect_with_config, ConnectionError};
pub use executor::{Database, DbError, PgDatabase, Rows};
pub use transaction::{PgTransaction, Transaction, TransactionError};
