//! Archive Restore Request Tool
//!
//! Requests restores of one granule's files out of an archival S3 bucket and
//! records every attempt in the request ledger.

// restoretool/src/main.rs
mod config;
mod errors;
mod ledger;
mod restore;
mod utils;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::env;
use std::fs;
use std::io::Read;
use std::process::ExitCode;

use ledger::StatusQuery;

/// Main entry point for the restore request tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    utils::init_logging();

    match run_app().await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<String> {
    let args: Vec<String> = env::args().collect();

    if args.get(1).map(String::as_str) == Some("status") {
        let query = parse_status_query(&args[2..])?;
        let attempts = restore::run_status_flow(&query)
            .await
            .context("Ledger status query failed")?;
        return serde_json::to_string(&attempts).context("Failed to render ledger rows");
    }

    let raw = match args.get(1) {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read invocation from {}", path))?,
        None => read_stdin()?,
    };

    let invocation: Value =
        serde_json::from_str(&raw).context("Failed to parse invocation JSON")?;

    let result = restore::run_restore_flow(&invocation)
        .await
        .context("Restore request failed")?;
    Ok(result.to_string())
}

fn parse_status_query(args: &[String]) -> Result<StatusQuery> {
    match args {
        [flag, id] if flag == "--group" => Ok(StatusQuery::Group(id.clone())),
        [id] if !id.starts_with("--") => Ok(StatusQuery::Granule(id.clone())),
        _ => bail!("Usage: restoretool status [--group <request_group_id> | <granule_id>]"),
    }
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read invocation from stdin")?;
    Ok(input)
}
