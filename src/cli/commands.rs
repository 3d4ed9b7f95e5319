//! CLI command implementations
//!
//! Each command builds its own [`ProxyConfig`] from an optional settings
//! file and returns the `data` payload of the response.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::cache::CachedClassifier;
use crate::classifier::RoutingDecision;
use crate::config::{ProxyConfig, ProxySettings};
use crate::context::{Clock, ConsistencyWindow, SystemClock};
use crate::propagation::{ContextPropagator, TokenCodec};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_statement, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments, dispatches, and writes one JSON response.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    match run_command(cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Classify { config, sql } => {
            let sql = match sql {
                Some(sql) => sql,
                None => read_statement()?,
            };
            classify(config.as_deref(), &sql)
        }
        Command::DecodeToken { secret, value } => Ok(decode_token(secret.as_deref(), &value)),
        Command::IssueToken {
            config,
            secret,
            databases,
        } => issue_token(
            config.as_deref(),
            secret.as_deref(),
            &databases,
            Arc::new(SystemClock),
        ),
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn load(path: Option<&Path>) -> CliResult<(Arc<ProxyConfig>, ProxySettings)> {
    let settings = match path {
        Some(path) => ProxySettings::from_file(path)?,
        None => ProxySettings::default(),
    };
    let config = Arc::new(ProxyConfig::new());
    settings.apply(&config)?;
    Ok((config, settings))
}

/// Intent, roles, write flag and cache key of a statement
pub fn classify(config_path: Option<&Path>, sql: &str) -> CliResult<Value> {
    let (config, _) = load(config_path)?;
    let classifier = CachedClassifier::new(config);

    let intent = classifier.classify(sql)?;
    let decision = RoutingDecision::for_intent(intent);

    Ok(json!({
        "intent": intent,
        "roles": decision.roles(),
        "write": classifier.is_write(sql)?,
        "cache_key": classifier.cache_key_for(sql),
    }))
}

/// Window carried by a token. Rejected tokens are reported, not failed.
pub fn decode_token(secret: Option<&str>, value: &str) -> Value {
    let codec = match secret {
        Some(secret) => TokenCodec::signed(secret.as_bytes()),
        None => TokenCodec::unsigned(),
    };

    match codec.try_decode(value) {
        Ok(window) => json!({
            "valid": true,
            "window": window,
            "latest_write": window.latest(),
        }),
        Err(e) => json!({
            "valid": false,
            "reason": e.to_string(),
            "window": ConsistencyWindow::new(),
        }),
    }
}

/// Cookie recording a write to each database at the clock's current time
pub fn issue_token(
    config_path: Option<&Path>,
    secret: Option<&str>,
    databases: &[String],
    clock: Arc<dyn Clock>,
) -> CliResult<Value> {
    if databases.iter().any(|name| name.trim().is_empty()) {
        return Err(CliError::invalid_input("database names must not be empty"));
    }
    let (config, settings) = load(config_path)?;

    let mut options = settings.propagation.to_options();
    if let Some(secret) = secret {
        options.signing_secret = Some(secret.as_bytes().to_vec());
    }
    let propagator = ContextPropagator::new(config, options).with_clock(clock.clone());

    let now = clock.now();
    let mut window = ConsistencyWindow::new();
    for name in databases {
        window.record_write(name, now);
    }

    Ok(json!({
        "token": propagator.codec().encode(&window),
        "set_cookie": propagator.on_request_end(&window),
        "expires_at": propagator.expires_at(&window),
        "window": window,
    }))
}

/// Effective settings of a settings file, secrets redacted
pub fn check_config(config_path: &Path) -> CliResult<Value> {
    let (config, mut settings) = load(Some(config_path))?;
    if settings.propagation.signing_secret.is_some() {
        settings.propagation.signing_secret = Some("<redacted>".to_string());
    }

    Ok(json!({
        "settings": serde_json::to_value(&settings)?,
        "databases": config.database_names(),
        "cache_store": config.cache().settings().store.name(),
    }))
}
