//! CLI module
//!
//! Offline tooling around the routing engine:
//! - classify: show the intent and roles of a statement
//! - decode-token: inspect a context cookie
//! - issue-token: mint a context cookie for a write
//! - check-config: validate a settings file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, classify, decode_token, issue_token, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_statement, write_error, write_response};
