//! Migration trait definition

use crate::executor::Database;
use crate::migration::logger::{MigrationLogger, Phase, Verdict};
use crate::migration::MigrationError;
use crate::transaction::Transaction;
use std::borrow::Cow;
use std::fmt;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// A node in a migration tree
///
/// Implemented by [`Operation`](crate::migration::Operation) (a single guarded
/// step) and [`Runner`](crate::migration::Runner) (an ordered group of
/// migrations), so trees nest to any depth.
///
/// `test` and `apply` own the transaction boundary when no transaction is
/// supplied: `test` always rolls back, `apply` commits on success and rolls
/// back on failure. When a transaction is supplied the migration only
/// participates in it; closing it is left to its owner.
///
/// Note: execution is synchronous. Each call blocks on its database round
/// trips and siblings never run concurrently.
pub trait Migration: Send + Sync {
    /// Label contributed to the log label stack
    fn label(&self) -> Cow<'_, str>;

    /// Run inside a transaction owned by the caller
    ///
    /// # Errors
    ///
    /// Returns the first `MigrationError` encountered.
    fn invoke(&self, tx: &dyn Transaction, scope: &Scope<'_>) -> Result<(), MigrationError>;

    /// Execute, then discard every change
    ///
    /// # Errors
    ///
    /// Returns the migration's error, or the rollback error, or both.
    fn test(
        &self,
        db: &dyn Database,
        tx: Option<&dyn Transaction>,
        logger: Option<&dyn MigrationLogger>,
    ) -> Result<(), MigrationError> {
        execute(self, Phase::Test, db, tx, logger)
    }

    /// Execute, then commit on success or roll back on failure
    ///
    /// # Errors
    ///
    /// Returns the migration's error, the commit error, or the migration's
    /// error together with a failed rollback.
    fn apply(
        &self,
        db: &dyn Database,
        tx: Option<&dyn Transaction>,
        logger: Option<&dyn MigrationLogger>,
    ) -> Result<(), MigrationError> {
        execute(self, Phase::Apply, db, tx, logger)
    }
}

/// Walk-time context handed down the tree
///
/// Carries the phase, the optional logger and the labels of every enclosing
/// runner. The label stack stands in for a parent pointer: it is only used to
/// render log lines.
#[derive(Clone)]
pub struct Scope<'a> {
    phase: Phase,
    logger: Option<&'a dyn MigrationLogger>,
    labels: Vec<String>,
}

impl<'a> Scope<'a> {
    pub fn root(phase: Phase, logger: Option<&'a dyn MigrationLogger>) -> Self {
        Self {
            phase,
            logger,
            labels: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn logger(&self) -> Option<&'a dyn MigrationLogger> {
        self.logger
    }

    /// Labels of the enclosing runners, outermost first
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Scope for the children of a labeled runner
    #[must_use]
    pub fn nested(&self, label: impl Into<String>) -> Scope<'a> {
        let mut labels = self.labels.clone();
        labels.push(label.into());
        Scope {
            phase: self.phase,
            logger: self.logger,
            labels,
        }
    }

    /// Log one outcome under `label`; a no-op without a logger
    pub fn record(&self, verdict: Verdict, label: &str, message: fmt::Arguments<'_>) {
        let Some(logger) = self.logger else {
            return;
        };
        let mut labels = self.labels.clone();
        labels.push(label.to_string());
        logger.record(verdict, self.phase, &labels, message);
    }
}

/// Run `migration` in `phase`, opening and closing a transaction unless one is supplied
pub(crate) fn execute<M>(
    migration: &M,
    phase: Phase,
    db: &dyn Database,
    tx: Option<&dyn Transaction>,
    logger: Option<&dyn MigrationLogger>,
) -> Result<(), MigrationError>
where
    M: Migration + ?Sized,
{
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::migration_span(phase.as_str(), &migration.label()).entered();

    let scope = Scope::root(phase, logger);
    if let Some(tx) = tx {
        return migration.invoke(tx, &scope);
    }

    let tx = db.begin()?;
    let result = migration.invoke(tx.as_ref(), &scope);
    close(phase, tx, result)
}

fn close(
    phase: Phase,
    tx: Box<dyn Transaction + '_>,
    result: Result<(), MigrationError>,
) -> Result<(), MigrationError> {
    if phase == Phase::Apply && result.is_ok() {
        return tx.commit().map_err(MigrationError::from);
    }

    match (result, tx.rollback()) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(rollback)) => Err(MigrationError::Transaction(rollback)),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(rollback)) => Err(MigrationError::RollbackFailed {
            error: Box::new(error),
            rollback,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::logger::MemoryLogger;

    #[test]
    fn test_scope_nesting_builds_label_stack() {
        let logger = MemoryLogger::new();
        let root = Scope::root(Phase::Test, Some(&logger));
        let inner = root.nested("schema").nested("users");

        assert!(root.labels().is_empty());
        assert_eq!(inner.labels(), ["schema".to_string(), "users".to_string()]);
        assert_eq!(inner.phase(), Phase::Test);

        inner.record(Verdict::Applied, "create table", format_args!("users"));
        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path(), "schema > users > create table");
        assert_eq!(records[0].phase, Phase::Test);
    }

    #[test]
    fn test_scope_without_logger_is_silent() {
        let scope = Scope::root(Phase::Apply, None);
        scope.record(Verdict::Failed, "create table", format_args!("widgets"));
        assert!(scope.logger().is_none());
    }
}
