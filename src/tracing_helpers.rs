//! Span helpers for the optional `tracing` feature.

use tracing::{info_span, Span};

/// Longest SQL prefix recorded on a query span.
const MAX_STATEMENT_LEN: usize = 120;

pub fn begin_transaction_span() -> Span {
    info_span!("schemaguard.transaction.begin")
}

pub fn commit_transaction_span() -> Span {
    info_span!("schemaguard.transaction.commit")
}

pub fn rollback_transaction_span() -> Span {
    info_span!("schemaguard.transaction.rollback")
}

pub fn execute_query_span(query: &str) -> Span {
    let statement = truncate(query.trim(), MAX_STATEMENT_LEN);
    info_span!("schemaguard.query", db.statement = statement)
}

/// One span per top-level `test` or `apply` call.
pub fn migration_span(phase: &str, label: &str) -> Span {
    info_span!("schemaguard.migration", phase, label)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("SELECT 1", 120), "SELECT 1");
        assert_eq!(truncate("abcdef", 3), "abc");
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate("aé", 2), "a");
    }
}
