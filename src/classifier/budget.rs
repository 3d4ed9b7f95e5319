//! Classification budget
//!
//! Pattern matching is cooperative: the deadline is checked before every
//! pattern evaluation, and statements over the size cap are refused before
//! any matching starts.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::patterns::NamedPattern;
use crate::error::ClassificationTimeout;

/// Default wall-clock budget for one classification pass.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(1);

/// Limits applied to a single classification pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationBudget {
    /// Wall-clock budget across all pattern evaluations
    pub time_limit: Duration,
    /// Statements longer than this are not matched at all
    pub max_statement_bytes: Option<usize>,
}

impl Default for ClassificationBudget {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_TIME_LIMIT,
            max_statement_bytes: None,
        }
    }
}

impl ClassificationBudget {
    /// Budget with a custom time limit
    pub fn with_time_limit(time_limit: Duration) -> Self {
        Self {
            time_limit,
            ..Default::default()
        }
    }

    /// Add a statement size cap
    pub fn with_max_statement_bytes(mut self, max: usize) -> Self {
        self.max_statement_bytes = Some(max);
        self
    }

    /// Start a matcher for one statement
    pub fn start<'a>(&self, statement: &'a str) -> Result<BudgetedMatcher<'a>, ClassificationTimeout> {
        let started = Instant::now();
        if let Some(max) = self.max_statement_bytes {
            if statement.len() > max {
                return Err(ClassificationTimeout {
                    statement_len: statement.len(),
                    pattern: None,
                    elapsed: Duration::ZERO,
                });
            }
        }
        Ok(BudgetedMatcher {
            statement,
            started,
            time_limit: self.time_limit,
        })
    }
}

/// Matches patterns against one statement until the budget is spent
pub struct BudgetedMatcher<'a> {
    statement: &'a str,
    started: Instant,
    time_limit: Duration,
}

impl<'a> BudgetedMatcher<'a> {
    /// Evaluate one pattern
    pub fn matches(&self, pattern: &NamedPattern) -> Result<bool, ClassificationTimeout> {
        let elapsed = self.started.elapsed();
        if elapsed > self.time_limit {
            return Err(ClassificationTimeout {
                statement_len: self.statement.len(),
                pattern: Some(pattern.name),
                elapsed,
            });
        }
        Ok(pattern.regex.is_match(self.statement))
    }

    /// True when any pattern in the table matches
    pub fn any(&self, patterns: &[NamedPattern]) -> Result<bool, ClassificationTimeout> {
        for pattern in patterns {
            if self.matches(pattern)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::patterns::WRITE;

    #[test]
    fn test_size_cap_refuses_before_matching() {
        let budget = ClassificationBudget::default().with_max_statement_bytes(8);
        let err = budget.start("SELECT * FROM users").err().unwrap();
        assert_eq!(err.statement_len, 19);
        assert_eq!(err.pattern, None);
    }

    #[test]
    fn test_exhausted_budget_names_pattern() {
        let budget = ClassificationBudget::with_time_limit(Duration::ZERO);
        let matcher = budget.start("INSERT INTO t VALUES (1)").unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let err = matcher.any(&WRITE).unwrap_err();
        assert_eq!(err.pattern, Some("begin"));
    }

    #[test]
    fn test_generous_budget_matches() {
        let budget = ClassificationBudget::default();
        let matcher = budget.start("DELETE FROM users").unwrap();
        assert!(matcher.any(&WRITE).unwrap());
    }
}
