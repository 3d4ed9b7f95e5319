//! CLI-specific error types

use std::fmt;
use std::io;

use crate::error::RouterError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Settings file error
    ConfigError,
    /// I/O error (stdin/stdout)
    IoError,
    /// Unusable command input
    InvalidInput,
    /// Routing failed, e.g. classification timed out under `raise`
    RoutingError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PROXY_CLI_CONFIG_ERROR",
            Self::IoError => "PROXY_CLI_IO_ERROR",
            Self::InvalidInput => "PROXY_CLI_INVALID_INPUT",
            Self::RoutingError => "PROXY_CLI_ROUTING_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<RouterError> for CliError {
    fn from(e: RouterError) -> Self {
        match e {
            RouterError::Configuration(message) => Self::config_error(message),
            other => Self::new(
                CliErrorCode::RoutingError,
                format!("{}: {}", other.code(), other),
            ),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
