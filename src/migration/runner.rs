//! Composite migrations

use crate::migration::migration::{Migration, Scope};
use crate::migration::MigrationError;
use crate::transaction::Transaction;
use std::borrow::Cow;

/// An ordered group of migrations run under one transaction
///
/// Children run in insertion order and the first failure stops the group:
/// later siblings are neither run nor logged. A labeled runner pushes its
/// label onto the log label stack of everything beneath it.
///
/// # Example
///
/// ```rust
/// use schemaguard::migration::{Operation, Runner, Statements};
///
/// let users = Runner::labeled("users")
///     .then(Operation::create_table("users", Statements::new(["CREATE TABLE users (id int)"])))
///     .then(Operation::create_column(
///         "users",
///         "email",
///         Statements::new(["ALTER TABLE users ADD COLUMN email text"]),
///     ));
/// let schema = Runner::labeled("schema").then(users);
/// assert_eq!(schema.len(), 1);
/// ```
#[derive(Default)]
pub struct Runner {
    label: Option<String>,
    children: Vec<Box<dyn Migration>>,
}

impl Runner {
    pub fn new(children: Vec<Box<dyn Migration>>) -> Self {
        Self {
            label: None,
            children,
        }
    }

    /// An empty runner whose label prefixes its children's log lines
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            children: Vec::new(),
        }
    }

    /// Append a child, builder style
    #[must_use]
    pub fn then(mut self, migration: impl Migration + 'static) -> Self {
        self.push(migration);
        self
    }

    pub fn push(&mut self, migration: impl Migration + 'static) {
        self.children.push(Box::new(migration));
    }

    pub fn push_boxed(&mut self, migration: Box<dyn Migration>) {
        self.children.push(migration);
    }

    pub fn children(&self) -> &[Box<dyn Migration>] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Extend<Box<dyn Migration>> for Runner {
    fn extend<I: IntoIterator<Item = Box<dyn Migration>>>(&mut self, iter: I) {
        self.children.extend(iter);
    }
}

impl Migration for Runner {
    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.label.as_deref().unwrap_or_default())
    }

    fn invoke(&self, tx: &dyn Transaction, scope: &Scope<'_>) -> Result<(), MigrationError> {
        let nested;
        let scope = match &self.label {
            Some(label) => {
                nested = scope.nested(label.as_str());
                &nested
            }
            None => scope,
        };

        for child in &self.children {
            child.invoke(tx, scope)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::logger::{MemoryLogger, MigrationLogger, Stats, Verdict};
    use crate::migration::{Operation, Statements};
    use crate::mock::MockDatabase;

    fn create_table(name: &str) -> Operation {
        Operation::create_table(name, Statements::new([format!("CREATE TABLE {name} (id int)")]))
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_children_run_in_order_under_one_transaction() {
        let db = MockDatabase::new();
        let runner = Runner::default()
            .then(create_table("a"))
            .then(create_table("b"))
            .then(create_table("c"));

        runner.apply(&db, None, None).expect("apply");

        assert_eq!(
            db.executed(),
            vec![
                "CREATE TABLE a (id int)".to_string(),
                "CREATE TABLE b (id int)".to_string(),
                "CREATE TABLE c (id int)".to_string(),
            ]
        );
        assert_eq!(db.begins(), 1);
        assert_eq!(db.commits(), 1);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_first_failure_stops_siblings() {
        let db = MockDatabase::new();
        db.fail_on("CREATE TABLE b");
        let logger = MemoryLogger::new();
        let runner = Runner::default()
            .then(create_table("a"))
            .then(create_table("b"))
            .then(create_table("c"));

        let err = runner.apply(&db, None, Some(&logger)).expect_err("b fails");
        assert!(matches!(err, MigrationError::Statement { .. }));

        assert!(!db.executed().iter().any(|sql| sql.contains("CREATE TABLE c")));
        let records = logger.records();
        assert_eq!(records.len(), 2, "c is never logged");
        assert_eq!(records[0].message, "a");
        assert_eq!(records[1].verdict, Verdict::Failed);
        // The whole tree rolls back, including a
        assert!(!db.has_table("a"));
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_failed_test_run_leaves_nothing_behind() {
        crate::test_helpers::init_logging();
        let db = MockDatabase::new();
        db.fail_on("ADD COLUMN n");
        let logger = MemoryLogger::new();
        let runner = Runner::default()
            .then(create_table("w"))
            .then(Operation::create_column(
                "w",
                "n",
                Statements::new(["ALTER TABLE w ADD COLUMN n text"]),
            ))
            .then(create_table("z"));

        let err = runner.test(&db, None, Some(&logger)).expect_err("column step fails");
        assert!(matches!(err, MigrationError::Statement { index: 0, .. }));

        assert!(!db.has_table("w"));
        assert!(!db.has_table("z"));
        assert_eq!(logger.stats(), Stats { applied: 1, skipped: 0, failed: 1 });
        assert!(logger.records().iter().all(|r| r.message != "z"), "z is never logged");
        assert!(!db.executed().iter().any(|sql| sql.contains("CREATE TABLE z")));
        assert_eq!(db.open_transactions(), 0);
        assert_eq!(db.commits(), 0);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_nested_test_run_leaves_nothing_behind() {
        let db = MockDatabase::new();
        let logger = MemoryLogger::new();
        let runner = Runner::labeled("widgets")
            .then(Operation::create_table(
                "widgets",
                Statements::new(["CREATE TABLE widgets (id int);"]),
            ))
            .then(Operation::create_column(
                "widgets",
                "name",
                Statements::new(["ALTER TABLE widgets ADD COLUMN name text;"]),
            ));

        runner.test(&db, None, Some(&logger)).expect("test run");

        // The column guard saw the table created earlier in the same transaction
        assert_eq!(logger.stats(), Stats { applied: 2, skipped: 0, failed: 0 });
        assert!(!db.has_table("widgets"));
        assert!(!db.has_column("widgets", "name"));
        assert_eq!(db.rollbacks(), 1);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_label_stack_follows_nesting() {
        let db = MockDatabase::new();
        let logger = MemoryLogger::new();
        let tree = Runner::labeled("schema")
            .then(Runner::labeled("users").then(create_table("users")))
            .then(Runner::default().then(create_table("orders")));

        tree.apply(&db, None, Some(&logger)).expect("apply");

        let paths: Vec<String> = logger.records().iter().map(|r| r.path()).collect();
        assert_eq!(paths, vec!["schema > users > create table", "schema > create table"]);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_reapply_is_idempotent() {
        let db = MockDatabase::new();
        let logger = MemoryLogger::new();
        let runner = Runner::default()
            .then(create_table("widgets"))
            .then(Operation::create_index(
                "widgets",
                "idx_widgets_id",
                Statements::new(["CREATE INDEX idx_widgets_id ON widgets (id)"]),
            ));

        runner.apply(&db, None, Some(&logger)).expect("first apply");
        runner.apply(&db, None, Some(&logger)).expect("second apply");

        assert_eq!(logger.stats(), Stats { applied: 2, skipped: 2, failed: 0 });
        assert_eq!(db.executed().len(), 2);
        assert!(db.has_index("widgets", "idx_widgets_id"));
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_empty_runner_succeeds() {
        let db = MockDatabase::new();
        Runner::default().apply(&db, None, None).expect("nothing to do");
        assert_eq!(db.commits(), 1);
    }

    #[test]
    fn test_new_and_extend() {
        let mut runner = Runner::new(vec![Box::new(create_table("a")) as Box<dyn Migration>]);
        runner.extend(vec![Box::new(create_table("b")) as Box<dyn Migration>]);
        runner.push_boxed(Box::new(create_table("c")));
        assert_eq!(runner.len(), 3);
        assert_eq!(runner.label(), "");
        assert_eq!(Runner::labeled("x").label(), "x");
    }
}
