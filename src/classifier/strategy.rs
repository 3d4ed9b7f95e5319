//! Timeout strategies
//!
//! Decide what a [`ClassificationTimeout`] means for the statement that hit
//! it: degrade to the conservative answer, or fail the statement.

use std::fmt;
use std::sync::Arc;

use crate::error::{ClassificationTimeout, RouterError, RouterResult};

/// Callback invoked for a timeout. Returning `Err` fails the statement,
/// returning `Ok` degrades to the conservative answer.
pub type TimeoutCallback = Arc<dyn Fn(&ClassificationTimeout) -> RouterResult<()> + Send + Sync>;

/// What to do when classification runs past its budget
#[derive(Clone, Default)]
pub enum TimeoutStrategy {
    /// Log the timeout and route conservatively
    #[default]
    Log,
    /// Surface the timeout to the caller
    Raise,
    /// Caller-defined handling
    Custom(TimeoutCallback),
}

impl TimeoutStrategy {
    /// Names accepted by [`TimeoutStrategy::from_name`]
    pub const NAMES: [&'static str; 2] = ["log", "raise"];

    /// Look up a built-in strategy by name
    pub fn from_name(name: &str) -> RouterResult<Self> {
        match name {
            "log" => Ok(Self::Log),
            "raise" => Ok(Self::Raise),
            other => Err(RouterError::configuration(format!(
                "Invalid regex timeout strategy: {:?}. Must be one of: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }

    /// Wrap a callback
    pub fn custom<F>(callback: F) -> Self
    where
        F: Fn(&ClassificationTimeout) -> RouterResult<()> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(callback))
    }

    /// Strategy name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Raise => "raise",
            Self::Custom(_) => "custom",
        }
    }

    /// Apply the strategy. `Ok(())` means "continue with the safe default".
    pub fn handle(&self, timeout: &ClassificationTimeout) -> RouterResult<()> {
        match self {
            Self::Log => {
                tracing::error!(
                    statement_len = timeout.statement_len,
                    pattern = timeout.pattern.unwrap_or("-"),
                    elapsed_ms = timeout.elapsed.as_millis() as u64,
                    "{}",
                    timeout
                );
                Ok(())
            }
            Self::Raise => Err(RouterError::ClassificationTimeout(timeout.clone())),
            Self::Custom(callback) => callback(timeout),
        }
    }
}

impl fmt::Debug for TimeoutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeoutStrategy::{}", self.name())
    }
}
