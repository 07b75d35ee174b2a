//! Guards decide whether an operation's body runs
//!
//! A guard pairs a verb with an existence check over the operation's subject
//! names:
//!
//! | verb     | body runs when            |
//! |----------|---------------------------|
//! | `create` | the subject does not exist |
//! | `alter`  | the subject exists         |
//! | `run`    | the predicate is true      |
//!
//! Every other combination skips the body. Subject count is validated before
//! the predicate is consulted, so a misconfigured operation never touches the
//! database.

use crate::executor::DbError;
use crate::migration::{predicate, MigrationError};
use crate::transaction::Transaction;
use std::fmt;
use std::sync::Arc;

/// What a guard intends to do with its subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Alter,
    Run,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Alter => "alter",
            Verb::Run => "run",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating a guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run,
    Skip,
}

/// Existence predicate used by [`CustomGuard`]
pub type ExistsFn = dyn Fn(&dyn Transaction, &[String]) -> Result<bool, DbError> + Send + Sync;

/// A caller-defined guard
///
/// The predicate receives the operation's subject names (at least `arity` of
/// them) and answers whether the subject exists.
///
/// # Example
///
/// ```rust
/// use schemaguard::migration::{CustomGuard, Verb};
///
/// let extension = CustomGuard::new(Verb::Create, "extension", 1, |tx, args| {
///     Ok(tx
///         .query("SELECT 1 FROM pg_extension WHERE extname = $1", &[&args[0]])?
///         .any())
/// });
/// assert_eq!(extension.arity(), 1);
/// ```
#[derive(Clone)]
pub struct CustomGuard {
    verb: Verb,
    noun: String,
    arity: usize,
    predicate: Arc<ExistsFn>,
}

impl CustomGuard {
    pub fn new<F>(verb: Verb, noun: impl Into<String>, arity: usize, predicate: F) -> Self
    where
        F: Fn(&dyn Transaction, &[String]) -> Result<bool, DbError> + Send + Sync + 'static,
    {
        Self {
            verb,
            noun: noun.into(),
            arity,
            predicate: Arc::new(predicate),
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn noun(&self) -> &str {
        &self.noun
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for CustomGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomGuard")
            .field("verb", &self.verb)
            .field("noun", &self.noun)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// The guard attached to an operation
#[derive(Debug, Clone)]
pub enum GuardKind {
    /// `create` + table existence; subject: table
    CreateTable,
    /// `alter` + table existence; subject: table
    AlterTable,
    /// `create` + column existence; subjects: table, column
    CreateColumn,
    /// `alter` + column existence; subjects: table, column
    AlterColumn,
    /// `create` + index existence; subjects: table, index
    CreateIndex,
    /// `alter` + index existence; subjects: table, index
    AlterIndex,
    /// `create` + constraint existence; subject: constraint
    CreateConstraint,
    /// `alter` + constraint existence; subject: constraint
    AlterConstraint,
    /// `create` + role existence (case-insensitive); subject: role
    CreateRole,
    /// `alter` + role existence (case-insensitive); subject: role
    AlterRole,
    /// `run` unconditionally; no subjects
    AlwaysRun,
    /// `run` when a SELECT returns rows; subject: the SELECT
    RunIfExists,
    /// `run` when a SELECT returns no rows; subject: the SELECT
    RunIfNotExists,
    Custom(CustomGuard),
}

impl GuardKind {
    pub fn verb(&self) -> Verb {
        match self {
            GuardKind::CreateTable
            | GuardKind::CreateColumn
            | GuardKind::CreateIndex
            | GuardKind::CreateConstraint
            | GuardKind::CreateRole => Verb::Create,
            GuardKind::AlterTable
            | GuardKind::AlterColumn
            | GuardKind::AlterIndex
            | GuardKind::AlterConstraint
            | GuardKind::AlterRole => Verb::Alter,
            GuardKind::AlwaysRun | GuardKind::RunIfExists | GuardKind::RunIfNotExists => Verb::Run,
            GuardKind::Custom(custom) => custom.verb,
        }
    }

    pub fn noun(&self) -> &str {
        match self {
            GuardKind::CreateTable | GuardKind::AlterTable => "table",
            GuardKind::CreateColumn | GuardKind::AlterColumn => "column",
            GuardKind::CreateIndex | GuardKind::AlterIndex => "index",
            GuardKind::CreateConstraint | GuardKind::AlterConstraint => "constraint",
            GuardKind::CreateRole | GuardKind::AlterRole => "role",
            GuardKind::AlwaysRun => "always",
            GuardKind::RunIfExists => "if exists",
            GuardKind::RunIfNotExists => "if not exists",
            GuardKind::Custom(custom) => &custom.noun,
        }
    }

    /// Number of positional subject names the guard reads
    pub fn arity(&self) -> usize {
        match self {
            GuardKind::CreateColumn
            | GuardKind::AlterColumn
            | GuardKind::CreateIndex
            | GuardKind::AlterIndex => 2,
            GuardKind::CreateTable
            | GuardKind::AlterTable
            | GuardKind::CreateConstraint
            | GuardKind::AlterConstraint
            | GuardKind::CreateRole
            | GuardKind::AlterRole
            | GuardKind::RunIfExists
            | GuardKind::RunIfNotExists => 1,
            GuardKind::AlwaysRun => 0,
            GuardKind::Custom(custom) => custom.arity,
        }
    }

    /// `"<verb> <noun>"`, e.g. `create table`
    pub fn label(&self) -> String {
        format!("{} {}", self.verb(), self.noun())
    }

    /// Decide whether the body should run
    ///
    /// # Errors
    ///
    /// - `MigrationError::ArgumentCount` if fewer than [`arity`](Self::arity) subjects are given
    /// - `MigrationError::InvalidGuardQuery` if a conditional guard's subject is not a SELECT
    /// - `MigrationError::Predicate` if the existence check fails
    pub fn evaluate(&self, tx: &dyn Transaction, args: &[String]) -> Result<Decision, MigrationError> {
        let expected = self.arity();
        if args.len() < expected {
            return Err(MigrationError::ArgumentCount {
                label: self.label(),
                expected,
                actual: args.len(),
            });
        }

        let exists = self.check(tx, args)?;
        Ok(decide(self.verb(), exists))
    }

    fn check(&self, tx: &dyn Transaction, args: &[String]) -> Result<bool, MigrationError> {
        let found = match self {
            GuardKind::CreateTable | GuardKind::AlterTable => predicate::table_exists(tx, &args[0]),
            GuardKind::CreateColumn | GuardKind::AlterColumn => {
                predicate::column_exists(tx, &args[0], &args[1])
            }
            GuardKind::CreateIndex | GuardKind::AlterIndex => {
                predicate::index_exists(tx, &args[0], &args[1])
            }
            GuardKind::CreateConstraint | GuardKind::AlterConstraint => {
                predicate::constraint_exists(tx, &args[0])
            }
            GuardKind::CreateRole | GuardKind::AlterRole => predicate::role_exists(tx, &args[0]),
            GuardKind::AlwaysRun => Ok(true),
            GuardKind::RunIfExists => {
                predicate::validate_select(&args[0])?;
                predicate::query_has_rows(tx, &args[0])
            }
            GuardKind::RunIfNotExists => {
                predicate::validate_select(&args[0])?;
                predicate::query_has_rows(tx, &args[0]).map(|rows| !rows)
            }
            GuardKind::Custom(custom) => (custom.predicate)(tx, args),
        };

        found.map_err(|source| MigrationError::Predicate {
            label: self.label(),
            source,
        })
    }
}

fn decide(verb: Verb, exists: bool) -> Decision {
    match (verb, exists) {
        (Verb::Create, false) | (Verb::Alter, true) | (Verb::Run, true) => Decision::Run,
        _ => Decision::Skip,
    }
}
