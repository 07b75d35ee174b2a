//! Guarded leaf operations

use crate::migration::guard::{CustomGuard, Decision, GuardKind};
use crate::migration::logger::Verdict;
use crate::migration::migration::{Migration, Scope};
use crate::migration::statement::Statements;
use crate::migration::MigrationError;
use crate::transaction::Transaction;
use std::borrow::Cow;

/// A single guarded step: one guard, one body, and the guard's subject names
///
/// Evaluating an operation logs exactly once: `applied` if the body ran,
/// `skipped` if the guard held it back, `failed` otherwise.
///
/// # Example
///
/// ```rust
/// use schemaguard::migration::{Operation, Statements};
///
/// let op = Operation::create_column(
///     "widgets",
///     "name",
///     Statements::new(["ALTER TABLE widgets ADD COLUMN name text"]),
/// );
/// assert_eq!(op.guard().label(), "create column");
/// assert_eq!(op.subject(), "widgets.name");
/// ```
#[derive(Debug, Clone)]
pub struct Operation {
    guard: GuardKind,
    body: Statements,
    args: Vec<String>,
}

impl Operation {
    /// Bind a guard to a body and positional subject names
    ///
    /// The number of subjects is checked when the operation runs, not here.
    pub fn new<I, S>(guard: GuardKind, body: Statements, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            guard,
            body,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn create_table(table: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::CreateTable, body, [table.into()])
    }

    pub fn alter_table(table: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::AlterTable, body, [table.into()])
    }

    pub fn create_column(table: impl Into<String>, column: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::CreateColumn, body, [table.into(), column.into()])
    }

    pub fn alter_column(table: impl Into<String>, column: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::AlterColumn, body, [table.into(), column.into()])
    }

    pub fn create_index(table: impl Into<String>, index: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::CreateIndex, body, [table.into(), index.into()])
    }

    pub fn alter_index(table: impl Into<String>, index: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::AlterIndex, body, [table.into(), index.into()])
    }

    pub fn create_constraint(constraint: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::CreateConstraint, body, [constraint.into()])
    }

    pub fn alter_constraint(constraint: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::AlterConstraint, body, [constraint.into()])
    }

    pub fn create_role(role: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::CreateRole, body, [role.into()])
    }

    pub fn alter_role(role: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::AlterRole, body, [role.into()])
    }

    /// Run the body every time
    pub fn always(body: Statements) -> Self {
        Self::new(GuardKind::AlwaysRun, body, Vec::<String>::new())
    }

    /// Run the body when `select` returns at least one row
    pub fn run_if_exists(select: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::RunIfExists, body, [select.into()])
    }

    /// Run the body when `select` returns no rows
    pub fn run_if_not_exists(select: impl Into<String>, body: Statements) -> Self {
        Self::new(GuardKind::RunIfNotExists, body, [select.into()])
    }

    pub fn custom<I, S>(guard: CustomGuard, body: Statements, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(GuardKind::Custom(guard), body, args)
    }

    pub fn guard(&self) -> &GuardKind {
        &self.guard
    }

    pub fn body(&self) -> &Statements {
        &self.body
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Subject names joined for display, e.g. `widgets.name`
    pub fn subject(&self) -> String {
        self.args.join(".")
    }

    fn run(&self, tx: &dyn Transaction) -> Result<Verdict, MigrationError> {
        match self.guard.evaluate(tx, &self.args)? {
            Decision::Run => {
                self.body.execute(tx)?;
                Ok(Verdict::Applied)
            }
            Decision::Skip => Ok(Verdict::Skipped),
        }
    }
}

impl Migration for Operation {
    fn label(&self) -> Cow<'_, str> {
        Cow::Owned(self.guard.label())
    }

    fn invoke(&self, tx: &dyn Transaction, scope: &Scope<'_>) -> Result<(), MigrationError> {
        let label = self.guard.label();
        let subject = self.subject();

        match self.run(tx) {
            Ok(verdict) => {
                scope.record(verdict, &label, format_args!("{subject}"));
                Ok(())
            }
            Err(e) => {
                scope.record(Verdict::Failed, &label, format_args!("{subject}: {e}"));
                Err(e)
            }
        }
    }
}
