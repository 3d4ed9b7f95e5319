//! Statement pattern tables
//!
//! Compiled once per process. All patterns are case-insensitive and run on
//! the `regex` crate's linear-time engine, so a single evaluation is bounded
//! by the statement length; the budget in [`super::budget`] bounds the sum.

use std::sync::LazyLock;

use regex::Regex;

/// A compiled pattern with a stable name for diagnostics
pub struct NamedPattern {
    pub name: &'static str,
    pub regex: Regex,
}

impl NamedPattern {
    fn compile(name: &'static str, source: &str) -> Self {
        // Sources are constants; test_all_tables_compile covers every table.
        let regex = Regex::new(source).expect("statement pattern must compile");
        Self { name, regex }
    }
}

/// `WITH name AS ( ... )` prefix of a common table expression
const CTE_SOURCE: &str = r"\A\s*WITH\s+(?P<cte>\S+\s+AS\s+\(\s?[\s\S]*\))";

/// Leading common table expression
pub static CTE: LazyLock<NamedPattern> =
    LazyLock::new(|| NamedPattern::compile("cte", &format!("(?i){}", CTE_SOURCE)));

/// Statements that must run on the primary even though they read
pub static PRIMARY: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        NamedPattern::compile("select_for_update", r"(?i)\A\s*select.+for update\n?\z"),
        NamedPattern::compile("lock_in_share_mode", r"(?i)select.+lock in share mode\n?\z"),
        NamedPattern::compile(
            "sequence_or_lock_function",
            r"(?i)\A\s*select.+(nextval|currval|lastval|get_lock|release_lock|pg_advisory_lock|pg_advisory_unlock)\(",
        ),
    ]
});

/// Statements a replica may serve
pub static REPLICA: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        NamedPattern::compile("select", r"(?i)\A\s*(select)\s"),
        NamedPattern::compile("cte_select", &format!(r"(?i){}\s*select", CTE_SOURCE)),
    ]
});

/// Session settings that must reach every pool
pub static ALL: LazyLock<Vec<NamedPattern>> =
    LazyLock::new(|| vec![NamedPattern::compile("set", r"(?i)\A\s*set\s")]);

/// Transaction-scoped settings that stay on a single pool
pub static SKIP_ALL: LazyLock<Vec<NamedPattern>> =
    LazyLock::new(|| vec![NamedPattern::compile("set_local", r"(?i)\A\s*set\s+local\s")]);

/// Statements that change data or bound a transaction
pub static WRITE: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    vec![
        NamedPattern::compile("begin", r"(?i)\ABEGIN"),
        NamedPattern::compile("commit", r"(?i)\ACOMMIT"),
        NamedPattern::compile("rollback", r"(?i)\AROLLBACK"),
        NamedPattern::compile("insert", r"(?i)INSERT\s[\s\S]*INTO\s[\s\S]*"),
        NamedPattern::compile("update", r"(?i)UPDATE\s[\s\S]*"),
        NamedPattern::compile("delete", r"(?i)DELETE\s[\s\S]*FROM\s[\s\S]*"),
        NamedPattern::compile("drop", r"(?i)DROP\s"),
    ]
});
