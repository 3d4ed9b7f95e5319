//! CLI argument definitions using clap
//!
//! Commands:
//! - replica-proxy classify [--config <path>] [SQL]
//! - replica-proxy decode-token [--secret <secret>] <VALUE>
//! - replica-proxy issue-token [--config <path>] [--secret <secret>] --database <name>...
//! - replica-proxy check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Primary/replica statement routing toolkit
#[derive(Parser, Debug)]
#[command(name = "replica-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify a statement and show where it would be routed
    Classify {
        /// Path to settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Statement text; read from stdin when omitted
        sql: Option<String>,
    },

    /// Decode a context token or cookie value
    DecodeToken {
        /// Secret the token was signed with
        #[arg(long)]
        secret: Option<String>,

        /// Token value
        value: String,
    },

    /// Issue a context cookie recording a write now
    IssueToken {
        /// Path to settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Signing secret, overriding the settings file
        #[arg(long)]
        secret: Option<String>,

        /// Database key that was written to (repeatable)
        #[arg(long = "database", required = true)]
        databases: Vec<String>,
    },

    /// Validate a settings file and print the effective settings
    CheckConfig {
        /// Path to settings file
        #[arg(long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_issue_token_databases() {
        let cli = Cli::try_parse_from([
            "replica-proxy",
            "issue-token",
            "--database",
            "primary",
            "--database",
            "reporting",
        ])
        .unwrap();
        match cli.command {
            Command::IssueToken { databases, secret, .. } => {
                assert_eq!(databases, vec!["primary", "reporting"]);
                assert!(secret.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_issue_token_requires_database() {
        assert!(Cli::try_parse_from(["replica-proxy", "issue-token"]).is_err());
    }

    #[test]
    fn test_classify_sql_is_optional() {
        let cli = Cli::try_parse_from(["replica-proxy", "classify"]).unwrap();
        assert!(matches!(cli.command, Command::Classify { sql: None, config: None }));
    }
}
