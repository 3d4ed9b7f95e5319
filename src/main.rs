//! replica-proxy CLI entry point
//!
//! Installs logging on stderr, dispatches to the CLI module, and exits
//! non-zero on failure. stdout carries only the JSON response.

use replica_proxy::{cli, observability};

fn main() {
    observability::init_logging("warn");

    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
