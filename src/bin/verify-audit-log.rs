use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use tracing::{error, info};

use audit_chain::audit::{find_tampered_entries, verify_entries, LogEntry};
use audit_chain::database::SqliteBackend;
use audit_chain::storage::{JsonlBackend, LogBackend};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("verify-audit-log")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify audit log hash chain integrity")
        .arg(
            Arg::new("log-path")
                .short('l')
                .long("log-path")
                .value_name("PATH")
                .help("JSONL log file, or SQLite database URL with --backend sqlite")
                .required(true),
        )
        .arg(
            Arg::new("backend")
                .short('b')
                .long("backend")
                .value_name("KIND")
                .value_parser(["jsonl", "sqlite"])
                .default_value("jsonl")
                .help("Storage format of the log"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .help("Suppress output except errors"),
        )
        .get_matches();

    let log_path = matches
        .get_one::<String>("log-path")
        .ok_or_else(|| anyhow!("--log-path is required"))?;
    let backend = matches
        .get_one::<String>("backend")
        .map(String::as_str)
        .unwrap_or("jsonl");
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let entries = match load_entries(log_path, backend).await {
        Ok(entries) => entries,
        Err(e) => {
            error!("Could not read audit log: {}", e);
            std::process::exit(2);
        }
    };

    let report = verify_entries(&entries);
    if verbose {
        print_summary(&entries);
    }

    if !report.ok {
        error!("Audit log verification failed: {}", report.summary());
        if verbose {
            println!("Entries that fail their own hash: {:?}", find_tampered_entries(&entries));
        }
        std::process::exit(1);
    }

    if !quiet {
        println!("✓ {}", report.summary());
    }

    Ok(())
}

async fn load_entries(log_path: &str, backend: &str) -> Result<Vec<LogEntry>> {
    info!("Verifying audit log: {}", log_path);

    let entries = match backend {
        "sqlite" => {
            SqliteBackend::open_read_only(log_path)
                .await?
                .load_all()
                .await?
        }
        _ => {
            if !Path::new(log_path).exists() {
                return Err(anyhow!("Audit log file not found: {}", log_path));
            }
            JsonlBackend::new(log_path)?.load_all().await?
        }
    };

    Ok(entries)
}

fn print_summary(entries: &[LogEntry]) {
    println!("Audit Log Summary:");
    println!("  Total entries: {}", entries.len());
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        println!("  First entry: {}", first.ts_string());
        println!("  Last entry: {}", last.ts_string());
        println!("  Head hash: {}", last.hash);
    }
}
