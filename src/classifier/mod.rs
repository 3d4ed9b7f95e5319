//! Statement Classifier
//!
//! Maps SQL text to an [`Intent`] by pattern matching. No parsing happens:
//! classification must run on every statement and tolerate dialect variance,
//! so the tables are biased toward sending doubtful statements to the primary.
//!
//! Priority order:
//! 1. Leading CTE and any write pattern → `ForcePrimary`
//! 2. Locking read or sequence/advisory-lock call → `ForcePrimary`
//! 3. Plain `SELECT` (optionally behind a non-writing CTE) → `Read`
//! 4. Session `SET` that is not `SET LOCAL` → `ForceAll`
//! 5. Write pattern → `Write`, anything else → `ForcePrimary`

pub mod budget;
mod intent;
pub mod patterns;
mod strategy;

pub use budget::ClassificationBudget;
pub use intent::{Intent, Role, RoutingDecision};
pub use strategy::{TimeoutCallback, TimeoutStrategy};

use crate::error::{ClassificationTimeout, RouterResult};
use crate::observability::{EventSink, ProxyEvent};

/// Classify a statement within the budget.
pub fn classify(statement: &str, budget: &ClassificationBudget) -> Result<Intent, ClassificationTimeout> {
    let matcher = budget.start(statement)?;

    if matcher.matches(&patterns::CTE)? && matcher.any(&patterns::WRITE)? {
        return Ok(Intent::ForcePrimary);
    }
    if matcher.any(&patterns::PRIMARY)? {
        return Ok(Intent::ForcePrimary);
    }
    if matcher.any(&patterns::REPLICA)? {
        return Ok(Intent::Read);
    }
    if !matcher.any(&patterns::SKIP_ALL)? && matcher.any(&patterns::ALL)? {
        return Ok(Intent::ForceAll);
    }
    if matcher.any(&patterns::WRITE)? {
        return Ok(Intent::Write);
    }
    Ok(Intent::ForcePrimary)
}

/// Whether a statement changes data or bounds a transaction.
pub fn is_write_statement(
    statement: &str,
    budget: &ClassificationBudget,
) -> Result<bool, ClassificationTimeout> {
    budget.start(statement)?.any(&patterns::WRITE)
}

/// [`classify`], with timeouts resolved by the strategy.
///
/// A tolerated timeout yields `ForcePrimary`.
pub fn classify_with_strategy(
    statement: &str,
    budget: &ClassificationBudget,
    strategy: &TimeoutStrategy,
    events: &dyn EventSink,
) -> RouterResult<Intent> {
    match classify(statement, budget) {
        Ok(intent) => Ok(intent),
        Err(timeout) => {
            report(&timeout, events);
            strategy.handle(&timeout)?;
            Ok(Intent::ForcePrimary)
        }
    }
}

/// [`is_write_statement`], with timeouts resolved by the strategy.
///
/// A tolerated timeout counts as a write.
pub fn is_write_with_strategy(
    statement: &str,
    budget: &ClassificationBudget,
    strategy: &TimeoutStrategy,
    events: &dyn EventSink,
) -> RouterResult<bool> {
    match is_write_statement(statement, budget) {
        Ok(is_write) => Ok(is_write),
        Err(timeout) => {
            report(&timeout, events);
            strategy.handle(&timeout)?;
            Ok(true)
        }
    }
}

fn report(timeout: &ClassificationTimeout, events: &dyn EventSink) {
    events.emit(&ProxyEvent::ClassificationTimeout {
        statement_len: timeout.statement_len,
        pattern: timeout.pattern,
    });
}
