//! In-memory database for tests
//!
//! [`MockDatabase`] keeps a small catalog (tables and their columns, indexes,
//! constraints, roles) and answers the catalog queries the guards issue.
//! Each transaction works on its own copy of the catalog; commit publishes it
//! and rollback (or drop) throws it away.
//!
//! Only the DDL shapes the tests rely on are understood. Any other statement
//! succeeds without touching the catalog.
//!
//! Available under `cfg(test)` and the `mock` feature.

use crate::executor::{Database, DbError, Rows};
use crate::migration::predicate::{
    COLUMN_EXISTS, CONSTRAINT_EXISTS, INDEX_EXISTS, ROLE_EXISTS, TABLE_EXISTS,
};
use crate::transaction::{Transaction, TransactionError};
use may_postgres::types::ToSql;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[allow(clippy::expect_used)] // Constant patterns
mod patterns {
    use super::*;

    pub(super) static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?is)^\s*CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?"?(\w+)"?\s*\((.*)\)"#)
            .expect("valid CREATE TABLE pattern")
    });
    pub(super) static DROP_TABLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)^\s*DROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?"?(\w+)"?"#)
            .expect("valid DROP TABLE pattern")
    });
    pub(super) static ALTER_TABLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)^\s*ALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?"?(\w+)"?"#)
            .expect("valid ALTER TABLE pattern")
    });
    pub(super) static ADD_COLUMN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)\bADD\s+COLUMN\s+(?:IF\s+NOT\s+EXISTS\s+)?"?(\w+)"?"#)
            .expect("valid ADD COLUMN pattern")
    });
    pub(super) static DROP_COLUMN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)\bDROP\s+COLUMN\s+(?:IF\s+EXISTS\s+)?"?(\w+)"?"#)
            .expect("valid DROP COLUMN pattern")
    });
    pub(super) static ADD_CONSTRAINT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)\bADD\s+CONSTRAINT\s+"?(\w+)"?"#).expect("valid ADD CONSTRAINT pattern")
    });
    pub(super) static CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?i)^\s*CREATE\s+(?:UNIQUE\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?"?(\w+)"?\s+ON\s+"?(\w+)"?"#,
        )
        .expect("valid CREATE INDEX pattern")
    });
    pub(super) static CREATE_ROLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)^\s*CREATE\s+ROLE\s+"?(\w+)"?"#).expect("valid CREATE ROLE pattern")
    });
}

use patterns::*;

#[derive(Debug, Clone, Default)]
struct Catalog {
    tables: BTreeMap<String, BTreeSet<String>>,
    indexes: BTreeSet<(String, String)>,
    constraints: BTreeSet<String>,
    roles: BTreeSet<String>,
}

impl Catalog {
    fn apply(&mut self, sql: &str) -> Result<(), DbError> {
        if let Some(caps) = CREATE_TABLE.captures(sql) {
            let if_not_exists = caps.get(1).is_some();
            let table = caps[2].to_string();
            if self.tables.contains_key(&table) {
                return if if_not_exists {
                    Ok(())
                } else {
                    Err(DbError::Query(format!("relation \"{table}\" already exists")))
                };
            }
            self.tables.insert(table, column_names(&caps[3]));
            return Ok(());
        }

        if let Some(caps) = DROP_TABLE.captures(sql) {
            let table = &caps[1];
            self.tables.remove(table);
            self.indexes.retain(|(t, _)| t != table);
            return Ok(());
        }

        if let Some(caps) = CREATE_INDEX.captures(sql) {
            let (index, table) = (caps[1].to_string(), caps[2].to_string());
            self.require_table(&table)?;
            self.indexes.insert((table, index));
            return Ok(());
        }

        if let Some(caps) = CREATE_ROLE.captures(sql) {
            let role = caps[1].to_lowercase();
            if !self.roles.insert(role.clone()) {
                return Err(DbError::Query(format!("role \"{role}\" already exists")));
            }
            return Ok(());
        }

        if let Some(caps) = ALTER_TABLE.captures(sql) {
            let table = caps[1].to_string();
            self.require_table(&table)?;
            if let Some(col) = ADD_COLUMN.captures(sql) {
                if let Some(columns) = self.tables.get_mut(&table) {
                    columns.insert(col[1].to_string());
                }
            }
            if let Some(col) = DROP_COLUMN.captures(sql) {
                if let Some(columns) = self.tables.get_mut(&table) {
                    columns.remove(&col[1]);
                }
            }
            if let Some(constraint) = ADD_CONSTRAINT.captures(sql) {
                self.constraints.insert(constraint[1].to_string());
            }
        }
        Ok(())
    }

    fn require_table(&self, table: &str) -> Result<(), DbError> {
        if self.tables.contains_key(table) {
            Ok(())
        } else {
            Err(DbError::Query(format!("relation \"{table}\" does not exist")))
        }
    }

    /// Row count for one of the guard catalog queries, `None` for anything else
    fn answer(&self, sql: &str, params: &[String]) -> Option<usize> {
        let param = |i: usize| params.get(i).map(String::as_str).unwrap_or_default();
        let found = match sql {
            TABLE_EXISTS => self.tables.contains_key(param(0)),
            COLUMN_EXISTS => self
                .tables
                .get(param(0))
                .is_some_and(|columns| columns.contains(param(1))),
            INDEX_EXISTS => self
                .indexes
                .contains(&(param(0).to_string(), param(1).to_string())),
            CONSTRAINT_EXISTS => self.constraints.contains(param(0)),
            ROLE_EXISTS => self.roles.contains(&param(0).to_lowercase()),
            _ => return None,
        };
        Some(usize::from(found))
    }
}

/// First identifier of every top-level entry in a column list, skipping table constraints
fn column_names(definition: &str) -> BTreeSet<String> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in definition.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    entries.push(current);

    entries
        .iter()
        .filter_map(|entry| entry.split_whitespace().next())
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| {
            !name.is_empty()
                && !matches!(
                    name.to_uppercase().as_str(),
                    "PRIMARY" | "CONSTRAINT" | "UNIQUE" | "FOREIGN" | "CHECK" | "EXCLUDE"
                )
        })
        .collect()
}

#[derive(Debug, Default)]
struct State {
    committed: Catalog,
    executed: Vec<String>,
    queries: Vec<String>,
    rows: HashMap<String, usize>,
    fail_on: Vec<String>,
    fail_commit: bool,
    fail_rollback: bool,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    open: usize,
}

impl State {
    fn failure_for(&self, sql: &str) -> Option<DbError> {
        self.fail_on
            .iter()
            .find(|needle| sql.contains(needle.as_str()))
            .map(|needle| DbError::Query(format!("injected failure on `{needle}`")))
    }
}

/// In-memory [`Database`] with failure injection
#[derive(Debug, Default)]
pub struct MockDatabase {
    state: Mutex<State>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a committed table with the given columns
    #[must_use]
    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        self.state().committed.tables.insert(
            table.to_string(),
            columns.iter().map(|c| (*c).to_string()).collect(),
        );
        self
    }

    #[must_use]
    pub fn with_index(self, table: &str, index: &str) -> Self {
        self.state()
            .committed
            .indexes
            .insert((table.to_string(), index.to_string()));
        self
    }

    #[must_use]
    pub fn with_constraint(self, constraint: &str) -> Self {
        self.state().committed.constraints.insert(constraint.to_string());
        self
    }

    #[must_use]
    pub fn with_role(self, role: &str) -> Self {
        self.state().committed.roles.insert(role.to_lowercase());
        self
    }

    /// Number of rows a non-catalog query returns; unknown queries return none
    pub fn set_rows(&self, sql: &str, rows: usize) {
        self.state().rows.insert(sql.to_string(), rows);
    }

    /// Fail every statement or query containing `needle`
    pub fn fail_on(&self, needle: &str) {
        self.state().fail_on.push(needle.to_string());
    }

    pub fn fail_commit(&self) {
        self.state().fail_commit = true;
    }

    /// Make rollback report an error; the transaction still ends
    pub fn fail_rollback(&self) {
        self.state().fail_rollback = true;
    }

    /// Every statement passed to `execute`, in order, including failed ones
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Every statement passed to `query`, in order
    pub fn queries(&self) -> Vec<String> {
        self.state().queries.clone()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state().committed.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.state()
            .committed
            .tables
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    pub fn has_index(&self, table: &str, index: &str) -> bool {
        self.state()
            .committed
            .indexes
            .contains(&(table.to_string(), index.to_string()))
    }

    pub fn has_constraint(&self, constraint: &str) -> bool {
        self.state().committed.constraints.contains(constraint)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.state().committed.roles.contains(&role.to_lowercase())
    }

    pub fn begins(&self) -> usize {
        self.state().begins
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state().rollbacks
    }

    /// Transactions begun and not yet committed, rolled back or dropped
    pub fn open_transactions(&self) -> usize {
        self.state().open
    }
}

impl Database for MockDatabase {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, TransactionError> {
        let working = {
            let mut state = self.state();
            state.begins += 1;
            state.open += 1;
            state.committed.clone()
        };
        Ok(Box::new(MockTransaction {
            db: self,
            working: RefCell::new(working),
            closed: false,
        }))
    }
}

/// Transaction handed out by [`MockDatabase`]
pub struct MockTransaction<'a> {
    db: &'a MockDatabase,
    working: RefCell<Catalog>,
    closed: bool,
}

impl MockTransaction<'_> {
    fn close(&mut self) -> MutexGuard<'_, State> {
        self.closed = true;
        let mut state = self.db.state();
        state.open = state.open.saturating_sub(1);
        state
    }
}

fn render_params(params: &[&dyn ToSql]) -> Vec<String> {
    params
        .iter()
        .map(|p| format!("{p:?}").trim_matches('"').to_string())
        .collect()
}

impl Transaction for MockTransaction<'_> {
    fn execute(&self, query: &str, _params: &[&dyn ToSql]) -> Result<u64, DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        {
            let mut state = self.db.state();
            state.executed.push(query.to_string());
            if let Some(err) = state.failure_for(query) {
                return Err(err);
            }
        }
        self.working.borrow_mut().apply(query)?;
        Ok(0)
    }

    fn query(&self, query: &str, params: &[&dyn ToSql]) -> Result<Rows, DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        let mut state = self.db.state();
        state.queries.push(query.to_string());
        if let Some(err) = state.failure_for(query) {
            return Err(err);
        }
        let params = render_params(params);
        let count = match self.working.borrow().answer(query, &params) {
            Some(count) => count,
            None => state.rows.get(query).copied().unwrap_or_default(),
        };
        Ok(Rows::new(count))
    }

    fn commit(mut self: Box<Self>) -> Result<(), TransactionError> {
        let working = self.working.take();
        let mut state = self.close();
        if state.fail_commit {
            return Err(TransactionError::Other("injected commit failure".to_string()));
        }
        state.committed = working;
        state.commits += 1;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), TransactionError> {
        let mut state = self.close();
        if state.fail_rollback {
            return Err(TransactionError::Other("injected rollback failure".to_string()));
        }
        state.rollbacks += 1;
        Ok(())
    }
}

impl Drop for MockTransaction<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let mut state = self.close();
        state.rollbacks += 1;
    }
}
