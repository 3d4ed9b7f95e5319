//! JSON I/O handling for CLI
//!
//! - Input: statement text via stdin when not given as an argument
//! - Output: single JSON object via stdout

use std::io::{self, Read, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read a statement from stdin
pub fn read_statement() -> CliResult<String> {
    let mut sql = String::new();
    io::stdin().lock().read_to_string(&mut sql)?;

    if sql.trim().is_empty() {
        return Err(CliError::invalid_input("Empty input"));
    }
    Ok(sql.trim_end_matches(['\r', '\n']).to_string())
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}
