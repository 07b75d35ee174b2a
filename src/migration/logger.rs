//! Step logging and outcome counters
//!
//! Every operation evaluation produces exactly one log call: `applied`,
//! `skipped` or `failed`. Each call carries the phase and the label stack
//! (ancestor runner labels followed by the operation's own `"<verb> <noun>"`),
//! and bumps one counter. The registry asks for a summary once per top-level
//! run through [`MigrationLogger::write_stats`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

const LOG_TARGET: &str = "schemaguard";

/// Whether a run is a dry run or a real one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Execute and always roll back
    Test,
    /// Execute and commit on success
    Apply,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Test => "test",
            Phase::Apply => "apply",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Applied,
    Skipped,
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Applied => "applied",
            Verdict::Skipped => "skipped",
            Verdict::Failed => "failed",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the outcome counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Stats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failed
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied: {}, skipped: {}, failed: {}",
            self.applied, self.skipped, self.failed
        )
    }
}

/// Running outcome counters shared by reference across a tree walk
#[derive(Debug, Default)]
pub struct Counters {
    applied: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Applied => &self.applied,
            Verdict::Skipped => &self.skipped,
            Verdict::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> Stats {
        Stats {
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.applied.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

/// Sink for per-step migration outcomes
///
/// One logger instance is handed to the root `test`/`apply` call and reaches
/// every operation in the tree through its [`Scope`](crate::migration::Scope).
/// Methods take `&self`; implementations keep their counters in
/// [`Counters`] or similar interior-mutable state.
pub trait MigrationLogger {
    /// The operation's guard passed and its body ran
    fn applied(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>);

    /// The operation's guard did not pass; nothing ran
    fn skipped(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>);

    /// Validation, the existence check or the body failed
    fn failed(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>);

    /// Emit the applied/skipped/failed totals
    fn write_stats(&self);

    /// Current totals
    fn stats(&self) -> Stats;

    /// Dispatch on a verdict
    fn record(&self, verdict: Verdict, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        match verdict {
            Verdict::Applied => self.applied(phase, labels, message),
            Verdict::Skipped => self.skipped(phase, labels, message),
            Verdict::Failed => self.failed(phase, labels, message),
        }
    }
}

/// Render a label stack as `outer > inner > create table`
pub fn join_labels(labels: &[String]) -> String {
    labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Logger backed by the `log` facade
///
/// Applied steps are logged at `info`, skipped steps at `debug` and failures
/// at `error`, all under the `schemaguard` target.
#[derive(Debug, Default)]
pub struct LogLogger {
    counters: Counters,
}

impl LogLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

impl MigrationLogger for LogLogger {
    fn applied(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        self.counters.record(Verdict::Applied);
        log::info!(target: LOG_TARGET, "[{phase}] {}: applied {message}", join_labels(labels));
    }

    fn skipped(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        self.counters.record(Verdict::Skipped);
        log::debug!(target: LOG_TARGET, "[{phase}] {}: skipped {message}", join_labels(labels));
    }

    fn failed(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        self.counters.record(Verdict::Failed);
        log::error!(target: LOG_TARGET, "[{phase}] {}: failed {message}", join_labels(labels));
    }

    fn write_stats(&self) {
        log::info!(target: LOG_TARGET, "{}", self.counters.snapshot());
    }

    fn stats(&self) -> Stats {
        self.counters.snapshot()
    }
}

/// One captured log call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub phase: Phase,
    pub verdict: Verdict,
    pub labels: Vec<String>,
    pub message: String,
}

impl Record {
    /// Label stack rendered the way [`LogLogger`] prints it
    #[must_use]
    pub fn path(&self) -> String {
        join_labels(&self.labels)
    }
}

/// Logger that keeps every record in memory
///
/// Useful for reporting after a run and for asserting on the trail of steps.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    counters: Counters,
    records: Mutex<Vec<Record>>,
    flushes: AtomicUsize,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records captured so far, oldest first
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times `write_stats` was called
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Drop captured records and zero the counters
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.counters.reset();
        self.flushes.store(0, Ordering::Relaxed);
    }

    fn push(&self, verdict: Verdict, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        self.counters.record(verdict);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Record {
                phase,
                verdict,
                labels: labels.to_vec(),
                message: message.to_string(),
            });
    }
}

impl MigrationLogger for MemoryLogger {
    fn applied(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        self.push(Verdict::Applied, phase, labels, message);
    }

    fn skipped(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        self.push(Verdict::Skipped, phase, labels, message);
    }

    fn failed(&self, phase: Phase, labels: &[String], message: fmt::Arguments<'_>) {
        self.push(Verdict::Failed, phase, labels, message);
    }

    fn write_stats(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        log::info!(target: LOG_TARGET, "{}", self.counters.snapshot());
    }

    fn stats(&self) -> Stats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_counters_record_one_counter_per_call() {
        let counters = Counters::new();
        counters.record(Verdict::Applied);
        counters.record(Verdict::Skipped);
        counters.record(Verdict::Skipped);

        let stats = counters.snapshot();
        assert_eq!(stats, Stats { applied: 1, skipped: 2, failed: 0 });
        assert_eq!(stats.total(), 3);

        counters.reset();
        assert_eq!(counters.snapshot(), Stats::default());
    }

    #[test]
    fn test_memory_logger_captures_records() {
        let logger = MemoryLogger::new();
        logger.applied(Phase::Apply, &labels(&["schema", "create table"]), format_args!("widgets"));
        logger.failed(Phase::Test, &labels(&["create column"]), format_args!("widgets.name: boom"));

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].verdict, Verdict::Applied);
        assert_eq!(records[0].path(), "schema > create table");
        assert_eq!(records[0].message, "widgets");
        assert_eq!(records[1].phase, Phase::Test);
        assert_eq!(logger.stats(), Stats { applied: 1, skipped: 0, failed: 1 });
    }

    #[test]
    fn test_record_dispatches_on_verdict() {
        let logger = LogLogger::new();
        logger.record(Verdict::Skipped, Phase::Test, &labels(&["create table"]), format_args!("widgets"));
        logger.write_stats();
        assert_eq!(logger.stats().skipped, 1);
    }

    #[test]
    fn test_join_labels_skips_empty() {
        assert_eq!(join_labels(&labels(&["", "users", "alter column"])), "users > alter column");
        assert_eq!(join_labels(&[]), "");
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(Phase::Test.to_string(), "test");
        assert_eq!(Verdict::Failed.to_string(), "failed");
        assert_eq!(
            Stats { applied: 1, skipped: 2, failed: 3 }.to_string(),
            "applied: 1, skipped: 2, failed: 3"
        );
    }
}
