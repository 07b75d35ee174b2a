//! Statement bodies

use crate::migration::MigrationError;
use crate::transaction::Transaction;
use sea_query::{PostgresQueryBuilder, SchemaStatementBuilder};

/// Ordered SQL statements executed when a guard passes
///
/// Statements run in order and execution stops at the first failure. Already
/// executed statements are left to the enclosing transaction to undo.
///
/// # Example
///
/// ```rust
/// use schemaguard::migration::Statements;
/// use sea_query::{Index, Expr};
///
/// let body = Statements::new(["CREATE TABLE widgets (id int, name text)"])
///     .push_schema(
///         Index::create()
///             .name("idx_widgets_name")
///             .table("widgets")
///             .col(Expr::col("name"))
///             .to_owned(),
///     );
/// assert_eq!(body.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statements {
    sql: Vec<String>,
}

impl Statements {
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sql: statements.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a literal statement
    #[must_use]
    pub fn push(mut self, sql: impl Into<String>) -> Self {
        self.sql.push(sql.into());
        self
    }

    /// Append a statement built with `sea_query`, rendered for PostgreSQL
    #[must_use]
    pub fn push_schema<S: SchemaStatementBuilder>(mut self, statement: S) -> Self {
        self.sql.push(statement.build(PostgresQueryBuilder));
        self
    }

    pub fn len(&self) -> usize {
        self.sql.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sql.iter().map(String::as_str)
    }

    /// Run every statement in order inside `tx`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Statement` for the first statement that fails.
    pub fn execute(&self, tx: &dyn Transaction) -> Result<(), MigrationError> {
        for (index, sql) in self.sql.iter().enumerate() {
            tx.execute(sql, &[])
                .map_err(|source| MigrationError::Statement {
                    index,
                    sql: sql.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for Statements {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
