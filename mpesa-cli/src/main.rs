//! `mpesa`: submit M-Pesa Daraja transactions from the command line.
//!
//! ```text
//! mpesa --config mpesa.toml stk-push amount=1 phone=254708374149
//! mpesa --dry-run b2c amount:=500 phone=254712345678 remarks="Refund"
//! ```
//!
//! Parameters are `key=value` pairs taken as strings, or `key:=json` for raw JSON values.
//! The provider response is printed to stdout as JSON. With `--dry-run` nothing is sent;
//! the request that would have been posted is printed instead.

#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from reqwest and openssl"
)]

mod observability;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use mpesa_bridge::{
    Config, EngineBuilder, Mpesa, MpesaError,
    cache::MemoryStore,
    transactions::{DEFAULT_APP, Endpoint},
    transport::RecordingTransport,
};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::observability::{LogFormat, init_observability};

/// Command-line client for the M-Pesa Daraja API.
#[derive(Parser, Debug)]
#[command(name = "mpesa")]
#[command(version)]
#[command(about = "Submit M-Pesa Daraja transactions")]
struct Cli {
    /// Transaction type, e.g. `stk-push`, `b2c`, `account-balance`.
    #[arg(value_parser = parse_endpoint)]
    transaction: Endpoint,

    /// Request parameters as `key=value` (string) or `key:=json`.
    #[arg(value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// TOML configuration file. `MPESA_*` environment variables are applied underneath.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Application whose consumer key and secret authenticate the call.
    #[arg(short, long, default_value = DEFAULT_APP)]
    app: String,

    /// Validate and print the request instead of sending it.
    #[arg(long)]
    dry_run: bool,

    /// Log output format. Defaults to `LOG_FORMAT` or pretty.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_endpoint(name: &str) -> Result<Endpoint, String> {
    name.parse().map_err(|e: MpesaError| e.to_string())
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    if let Some((key, json)) = raw.split_once(":=") {
        let value = serde_json::from_str(json).map_err(|e| format!("{key}: invalid JSON: {e}"))?;
        return Ok((key.to_owned(), value));
    }
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => {
            Ok((key.to_owned(), Value::String(value.to_owned())))
        }
        _ => Err(format!("expected key=value or key:=json, got '{raw}'")),
    }
}

fn load_config(path: Option<&PathBuf>) -> mpesa_bridge::Result<Config> {
    let builder = Config::builder().with_process_env();
    match path {
        Some(path) => builder.with_file(path).build(),
        None => builder.build(),
    }
}

async fn run(cli: Cli) -> mpesa_bridge::Result<Value> {
    let config = load_config(cli.config.as_ref())?;
    let params = Value::Object(cli.params.into_iter().collect::<Map<_, _>>());
    info!(transaction = %cli.transaction, app = %cli.app, dry_run = cli.dry_run, "submitting");

    if !cli.dry_run {
        let mpesa = Mpesa::from_config(config)?;
        return mpesa.submit(cli.transaction, params, &cli.app).await;
    }

    let transport = Arc::new(RecordingTransport::new());
    transport.push_json(200, &json!({"access_token": "dry-run", "expires_in": "3599"}));
    let engine = EngineBuilder::new(config)
        .cache_store(Arc::new(MemoryStore::new()))
        .build(Arc::clone(&transport))?;
    Mpesa::new(engine).submit(cli.transaction, params, &cli.app).await?;

    let request = transport.last_request().filter(|request| request.method == "POST");
    debug!(requests = transport.calls(), "dry run complete");
    Ok(request.map_or(Value::Null, |request| {
        json!({
            "method": request.method,
            "url": request.url,
            "body": request.json().unwrap_or(Value::Null),
        })
    }))
}

fn report(err: &MpesaError) {
    eprintln!("error: {err}");
    for message in err.messages() {
        eprintln!("  - {message}");
    }
    if let MpesaError::Provider { body, .. } = err {
        eprintln!("{body}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_observability(cli.log_format.unwrap_or_else(LogFormat::from_env), cli.verbose);

    match run(cli).await {
        Ok(response) => {
            match serde_json::to_string_pretty(&response) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{response}"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err);
            match err {
                MpesaError::Configuration { .. } => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
